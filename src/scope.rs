use {
    crate::{constants::*, error::excerpt, SignatureError},
    chrono::NaiveDate,
    std::{
        fmt::{Display, Formatter, Result as FmtResult},
        str::FromStr,
    },
};

/// The SigV4 credential scope: the date, region, and service a signature is bound to.
///
/// The string form is `YYYYMMDD/region/service/aws4_request`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ScopeInfo {
    date_stamp: String,
    region: String,
    service: String,
}

impl ScopeInfo {
    /// Create a new scope from its parts. The date stamp is used verbatim and should be in `YYYYMMDD` form.
    pub fn new<D, R, S>(date_stamp: D, region: R, service: S) -> Self
    where
        D: Into<String>,
        R: Into<String>,
        S: Into<String>,
    {
        Self {
            date_stamp: date_stamp.into(),
            region: region.into(),
            service: service.into(),
        }
    }

    /// Create a new scope for the given calendar date.
    pub fn for_date<R: Into<String>, S: Into<String>>(date: NaiveDate, region: R, service: S) -> Self {
        Self::new(date.format(ISO8601_DATE_FORMAT).to_string(), region, service)
    }

    /// The `YYYYMMDD` date stamp.
    #[inline]
    pub fn date_stamp(&self) -> &str {
        &self.date_stamp
    }

    /// The region, e.g. `us-east-1`.
    #[inline]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The service, e.g. `s3`.
    #[inline]
    pub fn service(&self) -> &str {
        &self.service
    }
}

impl Display for ScopeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}/{}/{}/{}", self.date_stamp, self.region, self.service, AWS4_REQUEST)
    }
}

impl FromStr for ScopeInfo {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, SignatureError> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 4 {
            return Err(SignatureError::IncompleteSignature(format!(
                "Credential scope must have exactly 4 slash-delimited elements, e.g. date/region/service/term, got '{}'",
                excerpt(s)
            )));
        }

        if parts[3] != AWS4_REQUEST {
            return Err(SignatureError::IncompleteSignature(format!(
                "Credential should be scoped with a valid terminator: 'aws4_request', not '{}'.",
                excerpt(parts[3])
            )));
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}
