//! core type-safe wrappers for the persistence boundary.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A validated table name.
///
/// Table names are restricted so they stay portable across the drivers the
/// engine may run against (Postgres, MySQL, SQLite identifiers).
///
/// Valid names:
/// - 1-64 characters
/// - Alphanumeric, underscores, hyphens only
/// - Must start with a letter or underscore
/// - Cannot be reserved names (_schema, _meta, etc.)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableName(String);

impl TableName {
    /// reserved table names that can't be used
    const RESERVED: &'static [&'static str] = &["_schema", "_meta", "_system"];

    /// create a new TableName, validating the input
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Validate a table name.
    fn validate(name: &str) -> Result<(), InvalidNameError> {
        if name.is_empty() {
            return Err(InvalidNameError::Empty);
        }

        if name.len() > 64 {
            return Err(InvalidNameError::TooLong(name.len()));
        }

        let first_char = name.chars().next().unwrap();
        if !first_char.is_ascii_alphabetic() && first_char != '_' {
            return Err(InvalidNameError::InvalidStart(first_char));
        }

        for (i, c) in name.chars().enumerate() {
            if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
                return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
            }
        }

        if Self::RESERVED.contains(&name.to_lowercase().as_str()) {
            return Err(InvalidNameError::Reserved(name.to_string()));
        }

        Ok(())
    }

    /// get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// convert to owned String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated row key (primary key).
///
/// Row keys are typically auto generated (ULIDs), but natural keys such as
/// ISBNs are accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey(String);

impl RowKey {
    pub fn new(key: impl Into<String>) -> Result<Self, InvalidNameError> {
        let key = key.into();
        Self::validate(&key)?;
        Ok(Self(key))
    }

    /// Validate a row key.
    fn validate(key: &str) -> Result<(), InvalidNameError> {
        if key.is_empty() {
            return Err(InvalidNameError::Empty);
        }

        if key.len() > 128 {
            return Err(InvalidNameError::TooLong(key.len()));
        }

        for (i, c) in key.chars().enumerate() {
            // alphanumeric, underscore, hyphen allowed
            if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
                return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
            }
        }

        Ok(())
    }

    /// get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// convert to owned String
    pub fn into_string(self) -> String {
        self.0
    }

    /// Generate a new ULID-based row key.
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RowKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// a db row with metadata and user data
///
/// Rows travel across the driver boundary as JSON objects. Metadata fields
/// carry a `_` prefix to avoid conflicts with user columns:
/// ```text
/// {
///   "_pk": "abc123",
///   "_version": 1,
///   "_created_at": "xxxx-xx-xxT00:00:00Z",
///   "_updated_at": "xxxx-xx-xxT00:00:00Z",
///   "title": "Rayuela",
///   "isbn": "9788437604572"
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// primary key
    pub key: RowKey,
    /// version number for optimistic concurrency control
    pub version: u64,
    /// creation timestamp
    pub created_at: String,
    /// last update timestamp
    pub updated_at: String,
    /// data (column values)
    pub data: BTreeMap<String, Value>,
}

impl Row {
    /// creates a new row with key & data
    ///
    /// sets v1 and current time
    pub fn new(key: RowKey, data: BTreeMap<String, Value>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            key,
            version: 1,
            created_at: now.clone(),
            updated_at: now,
            data,
        }
    }

    /// create a new row from a JSON value
    ///
    /// the value must be a JSON object; anything else is rejected
    pub fn from_value(key: RowKey, value: Value) -> Result<Self, Value> {
        match value {
            Value::Object(map) => Ok(Self::new(key, map.into_iter().collect())),
            other => Err(other),
        }
    }

    /// merge new data into existing data (for partial updates)
    ///
    /// increments version and updates the timestamp
    pub fn merge_data(&mut self, updates: BTreeMap<String, Value>) {
        for (k, v) in updates {
            self.data.insert(k, v);
        }
        self.version += 1;
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }

    /// get a column value by name
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.data.get(column)
    }

    /// check if the row has a column
    pub fn has_column(&self, column: &str) -> bool {
        self.data.contains_key(column)
    }

    /// user data as a JSON value (metadata excluded), for audit snapshots
    pub fn to_snapshot(&self) -> Value {
        Value::Object(self.data.clone().into_iter().collect())
    }
}

/// error type for invalid names (tables, row keys)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    TooLong(usize),
    InvalidStart(char),
    InvalidCharacter { char: char, position: usize },
    Reserved(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::TooLong(len) => write!(f, "name too long: {} characters", len),
            Self::InvalidStart(c) => write!(f, "name cannot start with '{}'", c),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character '{}' at position {}", char, position)
            }
            Self::Reserved(name) => write!(f, "'{}' is a reserved name", name),
        }
    }
}

impl std::error::Error for InvalidNameError {}
