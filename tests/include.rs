use std::{error::Error, path::Path};

use test_utils::{check_script, Expected};

const SRC_PATH: &str = "./tests/scripts/include_main.kst";
const EXPECTED: Expected = Expected {
    stdout: "hi!\n",
    stderr: "",
};

#[test]
fn run_include_merges_module_bindings() -> Result<(), Box<dyn Error>> {
    check_script(Path::new(SRC_PATH), EXPECTED)
}

#[test]
fn run_include_library_modules() -> Result<(), Box<dyn Error>> {
    check_script(
        Path::new("./tests/scripts/include_lib.kst"),
        Expected {
            stdout: "6\n[1, 2, 3]\n2\n",
            stderr: "",
        },
    )
}
