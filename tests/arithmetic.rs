use std::{error::Error, path::Path};

use test_utils::{check_script, Expected};

const SRC_PATH: &str = "./tests/scripts/arithmetic.kst";
const EXPECTED: Expected = Expected {
    stdout: "7\n3\n-4\n1\n1024\n3.5\n19\n",
    stderr: "",
};

#[test]
fn run_arithmetic() -> Result<(), Box<dyn Error>> {
    check_script(Path::new(SRC_PATH), EXPECTED)
}
