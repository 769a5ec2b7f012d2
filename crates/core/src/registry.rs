use crate::error::RegistryError;
use crate::models::RawRecord;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const SUCCESS_CODE: &str = "00";

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryQuery<'a> {
    Page { page_no: u32, page_size: u32 },
    ItemName { term: &'a str, rows: u32 },
    Efficacy { term: &'a str, rows: u32 },
}

impl RegistryQuery<'_> {
    fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            RegistryQuery::Page { page_no, page_size } => vec![
                ("numOfRows", page_size.to_string()),
                ("pageNo", page_no.to_string()),
            ],
            RegistryQuery::ItemName { term, rows } => vec![
                ("itemName", (*term).to_string()),
                ("numOfRows", rows.to_string()),
                ("pageNo", "1".to_string()),
            ],
            RegistryQuery::Efficacy { term, rows } => vec![
                ("efcyQesitm", (*term).to_string()),
                ("numOfRows", rows.to_string()),
                ("pageNo", "1".to_string()),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryResponse {
    Items(Vec<RawRecord>),
    /// The registry answered but with a non-success result code.
    Rejected { code: String, message: String },
}

impl RegistryResponse {
    /// Items of a successful response; a rejected response counts as none.
    pub fn into_items(self) -> Vec<RawRecord> {
        match self {
            RegistryResponse::Items(items) => items,
            RegistryResponse::Rejected { .. } => Vec::new(),
        }
    }
}

pub trait RegistryClient {
    fn fetch(&self, query: &RegistryQuery<'_>) -> Result<RegistryResponse, RegistryError>;
}

impl<T: RegistryClient + ?Sized> RegistryClient for &T {
    fn fetch(&self, query: &RegistryQuery<'_>) -> Result<RegistryResponse, RegistryError> {
        (**self).fetch(query)
    }
}

/// Blocking client for the MFDS easy-drug-info listing service.
pub struct KfdaRegistry {
    client: Client,
    base_url: String,
    service_key: String,
}

impl KfdaRegistry {
    /// `service_key` must be the decoded key; it is percent-encoded again when
    /// the request URL is built.
    pub fn new(
        base_url: impl Into<String>,
        service_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RegistryError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into(),
            service_key: service_key.into(),
        })
    }

    fn request_url(&self, query: &RegistryQuery<'_>) -> Result<Url, RegistryError> {
        let mut params = vec![("serviceKey", self.service_key.clone())];
        params.extend(query.params());
        params.push(("type", "json".to_string()));
        Ok(Url::parse_with_params(&self.base_url, &params)?)
    }
}

impl RegistryClient for KfdaRegistry {
    fn fetch(&self, query: &RegistryQuery<'_>) -> Result<RegistryResponse, RegistryError> {
        let url = self.request_url(query)?;
        let response = self.client.get(url).send()?;

        if !response.status().is_success() {
            return Err(RegistryError::Status(response.status().as_u16()));
        }

        let body = response.text()?;
        parse_envelope(&body)
    }
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    header: EnvelopeHeader,
    #[serde(default)]
    body: EnvelopeBody,
}

#[derive(Debug, Default, Deserialize)]
struct EnvelopeHeader {
    #[serde(rename = "resultCode", default)]
    result_code: Option<String>,
    #[serde(rename = "resultMsg", default)]
    result_msg: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EnvelopeBody {
    #[serde(default)]
    items: Value,
}

pub fn parse_envelope(body: &str) -> Result<RegistryResponse, RegistryError> {
    let envelope: Envelope = serde_json::from_str(body)?;
    let code = envelope.header.result_code.unwrap_or_default();

    if code != SUCCESS_CODE {
        return Ok(RegistryResponse::Rejected {
            code,
            message: envelope.header.result_msg.unwrap_or_default(),
        });
    }

    Ok(RegistryResponse::Items(normalize_items(envelope.body.items)))
}

/// The registry sends a list, a bare object for a single hit, or `""` when
/// empty. All three become a list.
pub fn normalize_items(items: Value) -> Vec<RawRecord> {
    let listed = match items {
        Value::Array(values) => values,
        Value::Object(_) => vec![items],
        _ => Vec::new(),
    };

    listed
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<RawRecord>(value) {
            Ok(record) => Some(record),
            Err(error) => {
                debug!(%error, "skipping undecodable registry item");
                None
            }
        })
        .collect()
}
