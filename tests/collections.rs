use std::{error::Error, path::Path};

use test_utils::{check_script, Expected};

const SRC_PATH: &str = "./tests/scripts/collections.kst";
const EXPECTED: Expected = Expected {
    stdout: "[1, 2, 3, 4]\n4\n1\n['a', 'b']\n{'a': 1, 'b': 20}\ncba\ntrue\n[2, 3]\n",
    stderr: "",
};

#[test]
fn run_collections() -> Result<(), Box<dyn Error>> {
    check_script(Path::new(SRC_PATH), EXPECTED)
}
