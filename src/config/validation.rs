use crate::config::types::{
    AlignmentConfig, Config, OntologyConfig, StoreConfig, UserAgentConfig, WikiConfig,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_store_config(&config.store)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_wiki_config(&config.wiki)?;
    validate_ontology_config(&config.ontology)?;
    validate_alignment_config(&config.alignment)?;
    Ok(())
}

fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_wiki_config(config: &WikiConfig) -> Result<(), ConfigError> {
    validate_http_url("wiki base_url", &config.base_url)?;

    if !config.article_path.starts_with('/') || !config.article_path.ends_with('/') {
        return Err(ConfigError::Validation(format!(
            "article_path must start and end with '/', got '{}'",
            config.article_path
        )));
    }

    if !config.related_url.contains("{namespace}") || !config.related_url.contains("{name}") {
        return Err(ConfigError::Validation(format!(
            "related_url must contain {{namespace}} and {{name}} placeholders, got '{}'",
            config.related_url
        )));
    }

    Selector::parse(&config.alias_selector)
        .map_err(|e| ConfigError::InvalidSelector(format!("{}: {:?}", config.alias_selector, e)))?;

    for seed in &config.seeds {
        validate_http_url("seed URL", seed)?;
    }

    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "wiki workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.retry_limit < 1 {
        return Err(ConfigError::Validation(
            "wiki retry_limit must be >= 1".to_string(),
        ));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "wiki timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_ontology_config(config: &OntologyConfig) -> Result<(), ConfigError> {
    validate_http_url("ontology endpoint", &config.endpoint)?;

    if config.page_size < 1 || config.page_size > 10_000 {
        return Err(ConfigError::Validation(format!(
            "page_size must be between 1 and 10000, got {}",
            config.page_size
        )));
    }

    if config.retry_limit < 1 {
        return Err(ConfigError::Validation(
            "ontology retry_limit must be >= 1".to_string(),
        ));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "ontology timeout_secs must be >= 1".to_string(),
        ));
    }

    Url::parse(&config.revision_predicate).map_err(|e| {
        ConfigError::InvalidUrl(format!(
            "Invalid revision_predicate '{}': {}",
            config.revision_predicate, e
        ))
    })?;

    for class in &config.classes {
        validate_target_name(&class.name)?;
        validate_iri(&class.iri)?;
    }

    for property in &config.properties {
        validate_target_name(&property.name)?;
        validate_target_name(&property.domain)?;
        validate_target_name(&property.range)?;
        validate_iri(&property.iri)?;
    }

    Ok(())
}

fn validate_alignment_config(config: &AlignmentConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&config.threshold) {
        return Err(ConfigError::Validation(format!(
            "alignment threshold must be within [0, 1], got {}",
            config.threshold
        )));
    }
    Ok(())
}

fn validate_http_url(what: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", what, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use HTTP or HTTPS",
            what, value
        )));
    }

    Ok(())
}

fn validate_target_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(ConfigError::Validation(format!(
            "ontology target names must be non-empty without whitespace, got '{}'",
            name
        )));
    }
    Ok(())
}

/// IRIs are spliced into SPARQL between angle brackets
fn validate_iri(iri: &str) -> Result<(), ConfigError> {
    Url::parse(iri).map_err(|e| ConfigError::InvalidUrl(format!("Invalid IRI '{}': {}", iri, e)))?;

    if iri.contains(['<', '>', '"', ' ', '{', '}']) {
        return Err(ConfigError::Validation(format!(
            "IRI '{}' contains characters not allowed in SPARQL IRIs",
            iri
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
