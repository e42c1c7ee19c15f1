use std::time::Duration;

/// Output captured from a backend process
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Combined stdout output
    pub stdout: String,
    /// Combined stderr output
    pub stderr: String,
    /// Exit code from the process
    pub exit_code: i32,
    /// Duration of execution
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn new(stdout: String, stderr: String, exit_code: i32, duration: Duration) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            duration,
        }
    }

    /// Check if the process exited successfully
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Convert into the generated text, treating a non-zero exit as failure
    pub fn into_text(self) -> Result<String, crate::BackendError> {
        if self.success() {
            Ok(self.stdout)
        } else {
            let detail = self.stderr.lines().last().unwrap_or("no stderr output");
            Err(crate::BackendError::ExecutionFailed(format!(
                "exited with code {}: {}",
                self.exit_code, detail
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackendError;

    #[test]
    fn empty_stdout_is_still_success() {
        let output = ProcessOutput::new(String::new(), String::new(), 0, Duration::ZERO);
        assert_eq!(output.into_text().unwrap(), "");
    }

    #[test]
    fn non_zero_exit_reports_last_stderr_line() {
        let output = ProcessOutput::new(
            "partial".into(),
            "warming up\nrate limited".into(),
            1,
            Duration::from_millis(5),
        );
        match output.into_text() {
            Err(BackendError::ExecutionFailed(msg)) => {
                assert!(msg.contains("code 1"));
                assert!(msg.contains("rate limited"));
            }
            other => panic!("expected ExecutionFailed, got {:?}", other),
        }
    }
}
