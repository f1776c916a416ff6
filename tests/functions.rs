use std::{error::Error, path::Path};

use test_utils::{check_script, Expected};

#[test]
fn run_recursive_factorial() -> Result<(), Box<dyn Error>> {
    check_script(
        Path::new("./tests/scripts/fact.kst"),
        Expected {
            stdout: "120\n",
            stderr: "",
        },
    )
}

#[test]
fn run_map_operator() -> Result<(), Box<dyn Error>> {
    check_script(
        Path::new("./tests/scripts/map.kst"),
        Expected {
            stdout: "[2, 4, 6]\n['a-', 'b-']\n",
            stderr: "",
        },
    )
}
