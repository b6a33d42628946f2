// src/apicall.rs
use chrono::{DateTime, Utc};
use std::fmt;

use crate::ct_log::{ClientError, Endpoint, HttpData};

/// Record of one call to a Log's API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCall {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub endpoint: Endpoint,
    pub status: Option<u16>,
    pub body: Vec<u8>,
    /// Rendered error, if the call failed
    pub error: Option<String>,
}

impl ApiCall {
    /// Create new record from the HTTP exchange and error of a single call
    pub fn new(endpoint: Endpoint, http_data: &HttpData, err: Option<&ClientError>) -> Self {
        Self {
            start: http_data.timing.start,
            end: http_data.timing.end,
            endpoint,
            status: http_data.status,
            body: http_data.body.clone(),
            error: err.map(|e| e.to_string()),
        }
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl fmt::Display for ApiCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "APICall {{")?;
        writeln!(f, "\tStart: {}", self.start)?;
        writeln!(f, "\tEnd: {}", self.end)?;
        writeln!(f, "\tEndpoint: {}", self.endpoint)?;
        writeln!(f, "\tResponse body: {}", self.body_str())?;
        match self.status {
            Some(s) => writeln!(f, "\tStatus: {}", s)?,
            None => writeln!(f, "\tStatus: <none>")?,
        }
        match &self.error {
            Some(e) => writeln!(f, "\tErr: {}", e)?,
            None => writeln!(f, "\tErr: <none>")?,
        }
        write!(f, "}}")
    }
}
