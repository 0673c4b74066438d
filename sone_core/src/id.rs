//! Content identifiers.
//!
//! A [`ContentId`] is the textual locator of data in the content network:
//!
//! ```text
//! TYPE@key[/docname[/edition]][/meta...]
//! ```
//!
//! `USK` identifiers are updatable: they always carry a document name and an
//! edition. Everything that subscribes to editions takes an
//! [`UpdatableKey`], which can only be obtained by validating a `ContentId`.

use std::fmt;
use std::str::FromStr;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentIdError {
    #[error("missing '@' separator in {0:?}")]
    MissingSeparator(String),
    #[error("unknown key type {0:?}")]
    UnknownKeyType(String),
    #[error("empty key in {0:?}")]
    EmptyKey(String),
    #[error("updatable key {0:?} needs a document name and an edition")]
    MissingEdition(String),
    #[error("empty document name before meta strings in {0:?}")]
    EmptyDocName(String),
    #[error("invalid edition {0:?}")]
    InvalidEdition(String),
    #[error("not an updatable key: {0}")]
    NotUpdatable(String),
}

/// The family a [`ContentId`] belongs to.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum KeyType {
    /// Content hash key, immutable.
    Chk,
    /// Signed subspace key.
    Ssk,
    /// Updatable subspace key, versioned by edition.
    Usk,
    /// Keyword signed key, addressed by a human readable name.
    Ksk,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Chk => "CHK",
            KeyType::Ssk => "SSK",
            KeyType::Usk => "USK",
            KeyType::Ksk => "KSK",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CHK" => Some(KeyType::Chk),
            "SSK" => Some(KeyType::Ssk),
            "USK" => Some(KeyType::Usk),
            "KSK" => Some(KeyType::Ksk),
            _ => None,
        }
    }
}

/// Locator of data in the content network.
///
/// Identifiers are plain values: two identifiers for the same updatable key
/// at different editions are different identifiers.
///
/// ```
/// use sone_core::ContentId;
///
/// let id: ContentId = "USK@abc,def,AQACAAE/Sone/12/sone.xml".parse().unwrap();
/// assert_eq!(id.edition(), Some(12));
/// assert_eq!(id.to_string(), "USK@abc,def,AQACAAE/Sone/12/sone.xml");
/// ```
#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ContentId {
    key_type: KeyType,
    key: String,
    doc_name: Option<String>,
    edition: Option<i64>,
    meta: Vec<String>,
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({self})")
    }
}

impl ContentId {
    pub fn new(key_type: KeyType, key: impl Into<String>) -> Self {
        Self {
            key_type,
            key: key.into(),
            doc_name: None,
            edition: None,
            meta: Vec::new(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, ContentIdError> {
        let (key_type, rest) = s
            .split_once('@')
            .ok_or_else(|| ContentIdError::MissingSeparator(s.to_owned()))?;
        let key_type = KeyType::parse(key_type)
            .ok_or_else(|| ContentIdError::UnknownKeyType(key_type.to_owned()))?;

        let mut segments: Vec<&str> = rest.split('/').collect();
        // A trailing slash ("SSK@key/") carries no information.
        while segments.len() > 1 && segments.last().is_some_and(|s| s.is_empty()) {
            segments.pop();
        }
        let key = segments.remove(0);
        if key.is_empty() {
            return Err(ContentIdError::EmptyKey(s.to_owned()));
        }

        let mut id = Self::new(key_type, key);
        let mut remaining = segments.into_iter();
        match key_type {
            KeyType::Ksk => {}
            KeyType::Usk => {
                let doc_name = remaining
                    .next()
                    .ok_or_else(|| ContentIdError::MissingEdition(s.to_owned()))?;
                let edition = remaining
                    .next()
                    .ok_or_else(|| ContentIdError::MissingEdition(s.to_owned()))?;
                let edition = edition
                    .parse::<i64>()
                    .map_err(|_| ContentIdError::InvalidEdition(edition.to_owned()))?;
                id.doc_name = Some(doc_name.to_owned());
                id.edition = Some(edition);
            }
            KeyType::Ssk | KeyType::Chk => match remaining.next() {
                Some("") if remaining.len() > 0 => {
                    return Err(ContentIdError::EmptyDocName(s.to_owned()));
                }
                Some("") | None => {}
                Some(doc_name) => id.doc_name = Some(doc_name.to_owned()),
            },
        }
        id.meta = remaining.map(str::to_owned).collect();
        Ok(id)
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// The routing part between `@` and the first `/`, or the keyword of a
    /// `KSK`.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn doc_name(&self) -> Option<&str> {
        self.doc_name.as_deref()
    }

    pub fn edition(&self) -> Option<i64> {
        self.edition
    }

    pub fn meta(&self) -> &[String] {
        &self.meta
    }

    pub fn is_updatable(&self) -> bool {
        self.key_type == KeyType::Usk && self.doc_name.is_some() && self.edition.is_some()
    }

    pub fn with_key_type(mut self, key_type: KeyType) -> Self {
        self.key_type = key_type;
        self
    }

    pub fn with_doc_name(mut self, doc_name: impl Into<String>) -> Self {
        self.doc_name = Some(doc_name.into());
        self
    }

    pub fn with_edition(mut self, edition: i64) -> Self {
        self.edition = Some(edition);
        self
    }

    pub fn with_meta<I, S>(mut self, meta: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.meta = meta.into_iter().map(Into::into).collect();
        self
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.key_type.as_str(), self.key)?;
        if let Some(doc_name) = &self.doc_name {
            write!(f, "/{doc_name}")?;
        }
        if let Some(edition) = self.edition {
            write!(f, "/{edition}")?;
        }
        for meta in &self.meta {
            write!(f, "/{meta}")?;
        }
        Ok(())
    }
}

impl FromStr for ContentId {
    type Err = ContentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A [`ContentId`] that is known to denote an updatable key.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct UpdatableKey(ContentId);

impl UpdatableKey {
    pub fn id(&self) -> &ContentId {
        &self.0
    }

    pub fn into_id(self) -> ContentId {
        self.0
    }

    pub fn edition(&self) -> i64 {
        self.0.edition.unwrap_or_default()
    }

    /// Returns the same key at another edition.
    pub fn at_edition(&self, edition: i64) -> Self {
        Self(self.0.clone().with_edition(edition))
    }

    /// Returns the edition-independent form of this key (edition 0, no meta
    /// strings). All editions of one key share the same family.
    pub fn family(&self) -> Self {
        Self(self.0.clone().with_edition(0).with_meta(Vec::<String>::new()))
    }
}

impl TryFrom<ContentId> for UpdatableKey {
    type Error = ContentIdError;

    fn try_from(id: ContentId) -> Result<Self, Self::Error> {
        if id.is_updatable() {
            Ok(Self(id))
        } else {
            Err(ContentIdError::NotUpdatable(id.to_string()))
        }
    }
}

impl FromStr for UpdatableKey {
    type Err = ContentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentId::parse(s)?.try_into()
    }
}

impl fmt::Display for UpdatableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keyword_keys() {
        let id = ContentId::parse("KSK@GPLv3.txt").unwrap();
        assert_eq!(id.key_type(), KeyType::Ksk);
        assert_eq!(id.key(), "GPLv3.txt");
        assert_eq!(id.doc_name(), None);
        assert!(!id.is_updatable());
        assert_eq!(id.to_string(), "KSK@GPLv3.txt");
    }

    #[test]
    fn parses_updatable_keys_with_meta() {
        let id = ContentId::parse("USK@routing,crypto,AQACAAE/Sone/3/sone.xml").unwrap();
        assert_eq!(id.key_type(), KeyType::Usk);
        assert_eq!(id.doc_name(), Some("Sone"));
        assert_eq!(id.edition(), Some(3));
        assert_eq!(id.meta(), ["sone.xml".to_owned()]);
        assert!(id.is_updatable());
    }

    #[test]
    fn trailing_slash_is_dropped() {
        let id = ContentId::parse("SSK@routing,crypto,AQACAAE/").unwrap();
        assert_eq!(id.doc_name(), None);
        assert_eq!(id.to_string(), "SSK@routing,crypto,AQACAAE");
    }

    #[test]
    fn empty_document_name_before_meta_is_rejected() {
        assert!(matches!(
            ContentId::parse("SSK@k//x"),
            Err(ContentIdError::EmptyDocName(_))
        ));
        assert!(matches!(
            ContentId::parse("CHK@k//x/y"),
            Err(ContentIdError::EmptyDocName(_))
        ));

        let id = ContentId::parse("SSK@k/x").unwrap();
        assert_eq!(id.doc_name(), Some("x"));
        assert_eq!(ContentId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn key_type_is_case_insensitive() {
        let id = ContentId::parse("chk@abc/file.png").unwrap();
        assert_eq!(id.key_type(), KeyType::Chk);
        assert_eq!(id.to_string(), "CHK@abc/file.png");
    }

    #[test]
    fn rejects_malformed_identifiers() {
        assert!(matches!(
            ContentId::parse("no-separator"),
            Err(ContentIdError::MissingSeparator(_))
        ));
        assert!(matches!(
            ContentId::parse("XYZ@abc"),
            Err(ContentIdError::UnknownKeyType(_))
        ));
        assert!(matches!(
            ContentId::parse("SSK@/doc"),
            Err(ContentIdError::EmptyKey(_))
        ));
        assert!(matches!(
            ContentId::parse("USK@abc/Sone"),
            Err(ContentIdError::MissingEdition(_))
        ));
        assert!(matches!(
            ContentId::parse("USK@abc/Sone/latest"),
            Err(ContentIdError::InvalidEdition(_))
        ));
    }

    #[test]
    fn updatable_key_requires_usk() {
        let ksk = ContentId::parse("KSK@GPLv3.txt").unwrap();
        assert!(matches!(
            UpdatableKey::try_from(ksk),
            Err(ContentIdError::NotUpdatable(_))
        ));

        let usk: UpdatableKey = "USK@abc/Sone/5".parse().unwrap();
        assert_eq!(usk.edition(), 5);
        assert_eq!(usk.at_edition(7).to_string(), "USK@abc/Sone/7");
    }

    #[test]
    fn editions_of_one_key_share_a_family() {
        let first: UpdatableKey = "USK@abc/Sone/1/sone.xml".parse().unwrap();
        let second: UpdatableKey = "USK@abc/Sone/9".parse().unwrap();
        assert_ne!(first, second);
        assert_eq!(first.family(), second.family());
        assert_eq!(first.family().to_string(), "USK@abc/Sone/0");
    }
}
