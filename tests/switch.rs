use std::{error::Error, path::Path};

use test_utils::{check_script, Expected};

const SRC_PATH: &str = "./tests/scripts/switch.kst";
const EXPECTED: Expected = Expected {
    stdout: "b\n",
    stderr: "",
};

#[test]
fn run_switch_guard() -> Result<(), Box<dyn Error>> {
    check_script(Path::new(SRC_PATH), EXPECTED)
}
