use std::error::Error;

use test_utils::run_repl;

#[test]
fn repl_echoes_truthy_statement_values() -> Result<(), Box<dyn Error>> {
    let output = run_repl("1 + 1\nvar x = 20\nx * 2 + 2\n")?;

    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("Welcome to Kst"));
    assert!(stdout.contains('2'));
    assert!(stdout.contains("42"));
    assert!(output.status.success());
    Ok(())
}
