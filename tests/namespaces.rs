use std::{error::Error, path::Path};

use test_utils::{check_script, Expected};

const SRC_PATH: &str = "./tests/scripts/namespaces.kst";
const EXPECTED: Expected = Expected {
    stdout: "42\n",
    stderr: "",
};

#[test]
fn run_namespace_using_star() -> Result<(), Box<dyn Error>> {
    check_script(Path::new(SRC_PATH), EXPECTED)
}
