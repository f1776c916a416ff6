use std::{error::Error, path::Path};

use test_utils::{check_script, Expected};

const SRC_PATH: &str = "./tests/scripts/try_catch.kst";
const EXPECTED: Expected = Expected {
    stdout: "MathError\noops\n",
    stderr: "",
};

#[test]
fn run_try_catch() -> Result<(), Box<dyn Error>> {
    check_script(Path::new(SRC_PATH), EXPECTED)
}
