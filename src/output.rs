use serde::Serialize;
use serde_json::Value;

/// Process exit codes
pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_INTERRUPTED: i32 = 130;

/// Accumulated outcome of one command, rendered as lines or as the single
/// JSON envelope `{ success, message, data, errors, warnings }`.
#[derive(Debug, Serialize)]
pub struct CommandReport {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl CommandReport {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.success = false;
    }

    /// Print the report and return the exit code
    pub fn emit(self, json: bool, verbose: bool) -> i32 {
        if json {
            match serde_json::to_string_pretty(&self) {
                Ok(rendered) => println!("{rendered}"),
                Err(err) => eprintln!("failed to render JSON output: {err}"),
            }
        } else {
            if self.success {
                println!("{}", self.message);
            } else {
                eprintln!("error: {}", self.message);
            }
            for warning in &self.warnings {
                eprintln!("warning: {warning}");
            }
            if verbose || !self.success {
                for error in &self.errors {
                    eprintln!("  - {error}");
                }
            }
        }
        if self.success {
            EXIT_OK
        } else {
            EXIT_FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_json_envelope_shape() {
        let mut report = CommandReport::ok("done").with_data(serde_json::json!({"count": 2}));
        report.warn("minor issue");

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["message"], "done");
        assert_eq!(value["data"]["count"], 2);
        assert_eq!(value["warnings"][0], "minor issue");
        assert!(value["errors"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_report_error_flips_success() {
        let mut report = CommandReport::ok("installing");
        report.error("disk full");
        assert!(!report.success);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CommandReport::ok("x").emit(true, false), EXIT_OK);
        assert_eq!(CommandReport::failure("x").emit(true, false), EXIT_FAILURE);
    }
}
