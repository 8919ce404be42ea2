use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Upload,
    Download,
}

/// Result of one whole-file copy, reported back to the owning tab
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub direction: TransferDirection,
    pub source: String,
    pub destination: String,
    pub error: Option<String>,
}

impl TransferOutcome {
    pub fn new(
        direction: TransferDirection,
        source: impl Into<String>,
        destination: impl Into<String>,
        result: crate::error::Result<()>,
    ) -> Self {
        Self {
            direction,
            source: source.into(),
            destination: destination.into(),
            error: result.err().map(|e| e.to_string()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.direction {
            TransferDirection::Upload => "Uploaded",
            TransferDirection::Download => "Downloaded",
        };
        match &self.error {
            None => write!(f, "{verb} {} to {}", self.source, self.destination),
            Some(err) => write!(
                f,
                "{} of {} failed: {err}",
                match self.direction {
                    TransferDirection::Upload => "Upload",
                    TransferDirection::Download => "Download",
                },
                self.source
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_outcome_message() {
        let ok = TransferOutcome::new(TransferDirection::Upload, "a.txt", "/srv/a.txt", Ok(()));
        assert!(ok.succeeded());
        assert_eq!(ok.to_string(), "Uploaded a.txt to /srv/a.txt");

        let failed = TransferOutcome::new(
            TransferDirection::Download,
            "/srv/b.txt",
            "./",
            Err(AppError::TransferError("scp: no such file".into())),
        );
        assert!(!failed.succeeded());
        assert_eq!(
            failed.to_string(),
            "Download of /srv/b.txt failed: Transfer error: scp: no such file"
        );
    }
}
