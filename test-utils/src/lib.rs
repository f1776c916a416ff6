use std::{
    error::Error,
    io,
    io::Write,
    path::Path,
    process::{Command, Output, Stdio},
    str,
};

const KST_PATH: &str = "./target/debug/kst";

pub struct Expected<'a> {
    pub stdout: &'a str,
    pub stderr: &'a str,
}

impl<'a> Expected<'a> {
    fn assert_matches(self, output: &Output) -> Result<(), Box<dyn Error>> {
        assert_eq!(str::from_utf8(&output.stdout)?, self.stdout);
        assert_eq!(str::from_utf8(&output.stderr)?, self.stderr);
        Ok(())
    }
}

fn run_interpreter(src_path: &Path) -> Result<Output, io::Error> {
    Command::new(KST_PATH).arg(src_path).output()
}

/// Run a script and compare both output streams exactly.
pub fn check_script(src_path: &Path, expected: Expected) -> Result<(), Box<dyn Error>> {
    let output = run_interpreter(src_path)?;

    expected.assert_matches(&output)?;
    assert!(
        output.status.success(),
        "Kst interpreter exited with status {:?}",
        output.status.code()
    );
    Ok(())
}

/// Run a script expected to fail: asserts the exit code and that every
/// fragment appears in the rendered diagnostic.
pub fn check_failure(src_path: &Path, fragments: &[&str]) -> Result<(), Box<dyn Error>> {
    let output = run_interpreter(src_path)?;

    assert_eq!(
        Some(1),
        output.status.code(),
        "expected the interpreter to exit with status 1"
    );
    let stderr = str::from_utf8(&output.stderr)?;
    for fragment in fragments {
        assert!(
            stderr.contains(fragment),
            "expected diagnostic to contain '{fragment}', got:\n{stderr}"
        );
    }
    Ok(())
}

/// Run a script and assert its exact exit code.
pub fn check_exit_code(src_path: &Path, expected: i32) -> Result<(), Box<dyn Error>> {
    let output = run_interpreter(src_path)?;
    assert_eq!(Some(expected), output.status.code());
    Ok(())
}

/// Feed lines to the REPL and return everything it printed.
pub fn run_repl(input: &str) -> Result<Output, Box<dyn Error>> {
    let mut child = Command::new(KST_PATH)
        .arg("stdin")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(input.as_bytes())?;
    Ok(child.wait_with_output()?)
}
