use std::{error::Error, path::Path};

use test_utils::check_failure;

#[test]
fn undefined_variable_is_diagnosed() -> Result<(), Box<dyn Error>> {
    check_failure(
        Path::new("./tests/scripts/undefined.kst"),
        &[
            "Traceback (most recent call last):",
            "in <program>",
            "VariableError: \"y\" is not defined",
            "^",
        ],
    )
}

#[test]
fn traceback_names_the_call_chain() -> Result<(), Box<dyn Error>> {
    check_failure(
        Path::new("./tests/scripts/traceback.kst"),
        &[
            "in outer",
            "in inner",
            "MathError: division by zero",
        ],
    )
}

#[test]
fn const_redefinition_is_rejected() -> Result<(), Box<dyn Error>> {
    check_failure(
        Path::new("./tests/scripts/const.kst"),
        &["VariableError: cannot redefine the const variable CONST_PI"],
    )
}
