use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    InvalidInput(anyhow::Error),
    ScenarioError(anyhow::Error),
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::ScenarioError(_) => ExitCode::ScenarioError,
            Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e) | Self::ScenarioError(e) | Self::RuntimeError(e) => e,
        }
    }

    /// Sorts an engine error into the exit-code classes.
    pub fn from_core(err: cyklop_core::runner::Error, context: &'static str) -> Self {
        use cyklop_core::runner::Error as CoreError;

        let kind = match &err {
            CoreError::EmptyScenario(_)
            | CoreError::UnknownUser(_)
            | CoreError::DuplicateUser(_) => Self::ScenarioError,
            CoreError::InvalidLogInterval => Self::InvalidInput,
            CoreError::Io(_) | CoreError::CollectorAlreadyOpen => Self::RuntimeError,
        };
        kind(anyhow::Error::new(err).context(context))
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(e) | Self::ScenarioError(e) | Self::RuntimeError(e) => {
                write!(f, "{e:#}")
            }
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyklop_core::runner::Error as CoreError;

    #[test]
    fn core_errors_map_to_exit_classes() {
        let cases = [
            (CoreError::EmptyScenario("s".into()), ExitCode::ScenarioError),
            (CoreError::UnknownUser("u".into()), ExitCode::ScenarioError),
            (CoreError::InvalidLogInterval, ExitCode::InvalidInput),
            (
                CoreError::Io(std::io::Error::other("disk full")),
                ExitCode::RuntimeError,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(RunError::from_core(err, "ctx").exit_code(), code);
        }
    }

    #[test]
    fn display_includes_context_chain() {
        let err = RunError::from_core(CoreError::UnknownUser("Buyer".into()), "invalid scenario");
        let text = err.to_string();
        assert!(text.contains("invalid scenario"), "{text}");
        assert!(text.contains("Buyer"), "{text}");
    }
}
