use std::{error::Error, path::Path};

use test_utils::{check_script, Expected};

const SRC_PATH: &str = "./tests/scripts/strings.kst";
const EXPECTED: Expected = Expected {
    stdout: "tab\tend\nraw\\tend\nb\nababab\nheLLo\na-b\n['a', 'b', 'c']\n7\n",
    stderr: "",
};

#[test]
fn run_strings() -> Result<(), Box<dyn Error>> {
    check_script(Path::new(SRC_PATH), EXPECTED)
}
