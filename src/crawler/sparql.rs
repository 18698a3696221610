//! SPARQL query construction and result decoding
//!
//! Queries are sent as HTTP GET with `query` and `format=json` parameters and
//! answered in the SPARQL 1.1 JSON results format.

use crate::crawler::fetcher::{HttpFetcher, NetworkError, OntologyEndpoint};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

const RDFS_PREFIX: &str = "PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>";

/// One solution of a SELECT query: variable name to lexical value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    bindings: HashMap<String, String>,
}

impl Row {
    /// Value bound to `var`, if any
    pub fn get(&self, var: &str) -> Option<&str> {
        self.bindings.get(var).map(String::as_str)
    }

    /// Value bound to `var` parsed as an integer
    pub fn get_i64(&self, var: &str) -> Option<i64> {
        self.get(var).and_then(|v| v.trim().parse().ok())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            bindings: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Deserialize)]
struct SparqlResults {
    bindings: Vec<HashMap<String, BindingValue>>,
}

#[derive(Deserialize)]
struct BindingValue {
    value: String,
}

/// Decodes a SPARQL JSON results document
///
/// A body that does not decode is treated as a truncated response.
pub fn parse_results(body: &str) -> Result<Vec<Row>, NetworkError> {
    let response: SparqlResponse = serde_json::from_str(body).map_err(|e| {
        tracing::debug!("Undecodable SPARQL response: {}", e);
        NetworkError::IncompleteRead
    })?;

    Ok(response
        .results
        .bindings
        .into_iter()
        .map(|solution| {
            solution
                .into_iter()
                .map(|(var, binding)| (var, binding.value))
                .collect()
        })
        .collect())
}

fn label_pattern(subject: &str, label: &str, language: &str) -> String {
    format!(
        "OPTIONAL {{ {subject} rdfs:label {label} . FILTER(langMatches(lang({label}), \"{language}\")) }}"
    )
}

/// Counts instances of a class at or above revision `watermark`
pub fn class_count_query(class_iri: &str, revision_predicate: &str, watermark: i64) -> String {
    format!(
        "SELECT (COUNT(DISTINCT ?s) AS ?count) WHERE {{\n  \
         ?s a <{class_iri}> ;\n     <{revision_predicate}> ?rev .\n  \
         FILTER(?rev >= {watermark})\n}}"
    )
}

/// Selects one page of class instances in ascending revision order
pub fn class_page_query(
    class_iri: &str,
    revision_predicate: &str,
    language: &str,
    watermark: i64,
    limit: u32,
    offset: u64,
) -> String {
    format!(
        "{RDFS_PREFIX}\nSELECT DISTINCT ?s ?label ?rev WHERE {{\n  \
         ?s a <{class_iri}> ;\n     <{revision_predicate}> ?rev .\n  \
         {labels}\n  \
         FILTER(?rev >= {watermark})\n}}\n\
         ORDER BY ASC(?rev) ?s\nLIMIT {limit} OFFSET {offset}",
        labels = label_pattern("?s", "?label", language),
    )
}

/// Counts property triples whose subject is at or above revision `watermark`
pub fn property_count_query(property_iri: &str, revision_predicate: &str, watermark: i64) -> String {
    format!(
        "SELECT (COUNT(*) AS ?count) WHERE {{\n  \
         ?s <{property_iri}> ?o ;\n     <{revision_predicate}> ?rev .\n  \
         FILTER(isIRI(?o))\n  \
         FILTER(?rev >= {watermark})\n}}"
    )
}

/// Selects one page of property triples in ascending revision order
pub fn property_page_query(
    property_iri: &str,
    revision_predicate: &str,
    language: &str,
    watermark: i64,
    limit: u32,
    offset: u64,
) -> String {
    format!(
        "{RDFS_PREFIX}\nSELECT ?s ?o ?rev ?slabel ?olabel WHERE {{\n  \
         ?s <{property_iri}> ?o ;\n     <{revision_predicate}> ?rev .\n  \
         FILTER(isIRI(?o))\n  \
         {slabels}\n  \
         {olabels}\n  \
         FILTER(?rev >= {watermark})\n}}\n\
         ORDER BY ASC(?rev) ?s ?o\nLIMIT {limit} OFFSET {offset}",
        slabels = label_pattern("?s", "?slabel", language),
        olabels = label_pattern("?o", "?olabel", language),
    )
}

/// SPARQL endpoint reached over HTTP
pub struct SparqlEndpoint {
    http: Arc<HttpFetcher>,
    endpoint: Url,
}

impl SparqlEndpoint {
    pub fn new(http: Arc<HttpFetcher>, endpoint: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            http,
            endpoint: Url::parse(endpoint)?,
        })
    }
}

#[async_trait]
impl OntologyEndpoint for SparqlEndpoint {
    async fn query(&self, sparql: &str) -> Result<Vec<Row>, NetworkError> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("query", sparql)
            .append_pair("format", "json");

        let response = self
            .http
            .get(url, "application/sparql-results+json")
            .await?;

        if !response.status.is_success() {
            return Err(NetworkError::from_status(response.status));
        }

        parse_results(&response.body)
    }
}
