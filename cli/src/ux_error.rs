use colored::Colorize;
use errors::{ConfigError, EngineError, ModelError, ValidationIssue};

#[derive(Debug, Clone)]
pub struct UxError {
    pub what: String,
    pub why: Option<String>,
    pub how_to_fix: Vec<String>,
    pub suggested_command: Option<String>,
}

impl UxError {
    pub fn new(what: impl Into<String>) -> Self {
        Self {
            what: what.into(),
            why: None,
            how_to_fix: Vec::new(),
            suggested_command: None,
        }
    }

    pub fn why(mut self, reason: impl Into<String>) -> Self {
        self.why = Some(reason.into());
        self
    }

    pub fn fix(mut self, suggestion: impl Into<String>) -> Self {
        self.how_to_fix.push(suggestion.into());
        self
    }

    pub fn suggest(mut self, cmd: impl Into<String>) -> Self {
        self.suggested_command = Some(cmd.into());
        self
    }

    pub fn display(&self) {
        eprintln!();
        eprintln!("{} {}", "error:".red().bold(), self.what.white().bold());

        if let Some(why) = &self.why {
            for line in why.lines() {
                eprintln!("       {}", line.dimmed());
            }
        }

        if !self.how_to_fix.is_empty() {
            eprintln!();
            eprintln!("{}", "How to fix:".yellow().bold());
            for (i, fix) in self.how_to_fix.iter().enumerate() {
                eprintln!("  {}. {}", i + 1, fix);
            }
        }

        if let Some(cmd) = &self.suggested_command {
            eprintln!();
            eprintln!("{}", "Try this:".green().bold());
            eprintln!("  $ {}", cmd.cyan());
        }
        eprintln!();
    }
}

impl std::fmt::Display for UxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.what)
    }
}

impl std::error::Error for UxError {}

/// A friendlier rendering for the engine errors users can act on.
pub fn explain(err: &anyhow::Error) -> Option<UxError> {
    if let Some(ux) = err.downcast_ref::<UxError>() {
        return Some(ux.clone());
    }
    if let Some(config) = err.downcast_ref::<ConfigError>() {
        return from_config(config);
    }
    if let Some(model) = err.downcast_ref::<ModelError>() {
        return from_model(model);
    }
    match err.downcast_ref::<EngineError>()? {
        EngineError::Config(config) => from_config(config),
        EngineError::Model(model) => from_model(model),
    }
}

fn from_config(err: &ConfigError) -> Option<UxError> {
    match err {
        ConfigError::Rejected { issues } => Some(rejected(issues)),
        ConfigError::ProfileNotFound { name } => Some(profile_not_found(name)),
        ConfigError::Parse { origin, reason, .. } => Some(parse_failed(origin, reason)),
        ConfigError::InvalidPath { path, reason } => Some(invalid_path(path, reason)),
        _ => None,
    }
}

fn from_model(err: &ModelError) -> Option<UxError> {
    match err {
        ModelError::UnknownModel { model_id } => Some(unknown_model(model_id)),
        ModelError::Config(config) => from_config(config),
        _ => None,
    }
}

pub fn rejected(issues: &[ValidationIssue]) -> UxError {
    let why = issues
        .iter()
        .map(|issue| format!("{issue} ({})", issue.validator))
        .collect::<Vec<_>>()
        .join("\n");
    UxError::new("Configuration rejected, nothing was changed")
        .why(why)
        .fix("Correct the value and try again")
        .suggest("foldersd config validate")
}

pub fn profile_not_found(name: &str) -> UxError {
    UxError::new(format!("Configuration profile '{}' not found", name))
        .why("Profiles are read from <name>.yaml, <name>.yml or <name>.toml in the profiles directory")
        .fix("Create the profile file or pick another profile")
        .fix("Unset FOLDERSD_PROFILE to run without a profile")
        .suggest("foldersd config paths")
}

pub fn parse_failed(origin: &str, reason: &str) -> UxError {
    UxError::new(format!("Cannot parse configuration file '{}'", origin))
        .why(reason.to_string())
        .fix(format!("Fix the syntax error in {origin}"))
        .fix("The running daemon keeps its previous configuration until the file parses")
}

pub fn invalid_path(path: &str, reason: &str) -> UxError {
    UxError::new(format!("Invalid configuration path: '{}'", path))
        .why(reason.to_string())
        .fix("Paths look like section.key or folders[0].path")
        .suggest("foldersd config show --sources")
}

pub fn unknown_model(model_id: &str) -> UxError {
    UxError::new(format!("Unknown embedding model: '{}'", model_id))
        .why("Only models from the curated catalog can be selected")
        .fix("Pick one of the listed model ids")
        .suggest("foldersd model list")
}
