use std::{error::Error, path::Path};

use test_utils::check_exit_code;

#[test]
fn exit_status_propagates() -> Result<(), Box<dyn Error>> {
    check_exit_code(Path::new("./tests/scripts/exit_code.kst"), 3)
}
