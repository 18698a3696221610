use crate::state::DEFAULT_REVISIT_DAYS;
use serde::Deserialize;

/// Main configuration structure for Trope-Atlas
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub wiki: WikiConfig,
    #[serde(default)]
    pub ontology: OntologyConfig,
    #[serde(default)]
    pub alignment: AlignmentConfig,
}

/// Entity store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the user agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Link-following wiki crawler configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct WikiConfig {
    /// Scheme and host of the wiki, e.g. `https://tvtropes.org`
    pub base_url: String,

    /// Path prefix preceding `<Namespace>/<Name>` in article URLs
    pub article_path: String,

    /// Template of the alias ("related") endpoint; `{namespace}` and `{name}`
    /// are substituted with the canonical key
    pub related_url: String,

    /// CSS selector matching alias links on the related page
    pub alias_selector: String,

    /// Body text marking a "no such article" page
    pub not_found_marker: String,

    /// Seed article URLs
    pub seeds: Vec<String>,

    /// Namespaces that are skipped as administrative pages
    pub administrative_namespaces: Vec<String>,

    /// Namespaces whose articles are tropes
    pub trope_namespaces: Vec<String>,

    /// Namespaces whose articles are creators
    pub creator_namespaces: Vec<String>,

    /// Minimum days between two crawls of the same article
    pub revisit_interval_days: u32,

    /// Maximum number of concurrent visits
    pub workers: u32,

    /// Attempts per fetch when the failure is transient
    pub retry_limit: u32,

    /// Pause between fetch attempts (milliseconds)
    pub retry_delay_ms: u64,

    /// Minimum time between two requests to the same host (milliseconds)
    pub request_delay_ms: u64,

    /// Request timeout (seconds)
    pub timeout_secs: u64,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://tvtropes.org".to_string(),
            article_path: "/pmwiki/pmwiki.php/".to_string(),
            related_url: "https://tvtropes.org/pmwiki/relatedsearch.php?term={namespace}/{name}"
                .to_string(),
            alias_selector: "#redirects a[href]".to_string(),
            not_found_marker: "We don't have an article named".to_string(),
            seeds: Vec::new(),
            administrative_namespaces: vec![
                "Administrivia".to_string(),
                "Tropers".to_string(),
                "TVTropes".to_string(),
                "Help".to_string(),
                "Forum".to_string(),
            ],
            trope_namespaces: vec!["Main".to_string()],
            creator_namespaces: vec!["Creator".to_string()],
            revisit_interval_days: DEFAULT_REVISIT_DAYS,
            workers: 4,
            retry_limit: 3,
            retry_delay_ms: 5000,
            request_delay_ms: 1000,
            timeout_secs: 30,
        }
    }
}

/// Paginated ontology sync configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OntologyConfig {
    /// SPARQL endpoint URL
    pub endpoint: String,

    /// Rows requested per page
    pub page_size: u32,

    /// Attempts per page request when the failure is transient
    pub retry_limit: u32,

    /// Pause between attempts (milliseconds)
    pub retry_delay_ms: u64,

    /// Predicate carrying the resource revision number
    pub revision_predicate: String,

    /// Language tag used to pick `rdfs:label`
    pub label_language: String,

    /// Request timeout (seconds)
    pub timeout_secs: u64,

    /// Ontology classes synchronised as entities
    pub classes: Vec<ClassTarget>,

    /// Ontology properties synchronised as relations
    pub properties: Vec<PropertyTarget>,
}

impl Default for OntologyConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://dbpedia.org/sparql".to_string(),
            page_size: 100,
            retry_limit: 20,
            retry_delay_ms: 1000,
            revision_predicate: "http://dbpedia.org/ontology/wikiPageRevisionID".to_string(),
            label_language: "en".to_string(),
            timeout_secs: 60,
            classes: Vec::new(),
            properties: Vec::new(),
        }
    }
}

/// An ontology class whose instances become entities in the `name` namespace
#[derive(Debug, Clone, Deserialize)]
pub struct ClassTarget {
    /// Namespace label, e.g. `Film`
    pub name: String,

    /// Class IRI, e.g. `http://dbpedia.org/ontology/Film`
    pub iri: String,
}

/// An ontology property whose triples become relations
#[derive(Debug, Clone, Deserialize)]
pub struct PropertyTarget {
    /// Predicate label stored on the relation, e.g. `director`
    pub name: String,

    /// Property IRI
    pub iri: String,

    /// Namespace of the subject entities
    pub domain: String,

    /// Namespace of the object entities
    pub range: String,
}

/// Similarity measure used by the alignment pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimilarityMetric {
    Levenshtein,
    JaroWinkler,
}

/// Alignment configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AlignmentConfig {
    /// Wiki namespaces holding works
    pub wiki_namespaces: Vec<String>,

    /// Ontology namespaces holding works
    pub ontology_namespaces: Vec<String>,

    /// Minimum similarity for two entities to be the same work
    pub threshold: f64,

    /// Similarity measure
    pub metric: SimilarityMetric,

    /// Prefix stripped from URL-shaped labels
    pub resource_prefix: String,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            wiki_namespaces: vec!["Film".to_string()],
            ontology_namespaces: vec!["Film".to_string()],
            threshold: 0.9,
            metric: SimilarityMetric::Levenshtein,
            resource_prefix: "http://dbpedia.org/resource/".to_string(),
        }
    }
}
