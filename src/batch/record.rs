//! Canonical import record.
//!
//! Import sources arrive as loosely-keyed JSON objects (the catalog's CSV
//! uploads are bilingual: Spanish headers from the storefront back office,
//! English headers from distributor feeds). `ImportRecord::from_value`
//! flattens the synonyms into one canonical shape with lenient parsing:
//! unparsable numerics default to 0, availability defaults to true unless
//! the value is an explicit "false"/"no" equivalent.

use std::collections::BTreeMap;

use serde_json::Value;

/// One import row in canonical shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRecord {
    pub title: String,
    pub isbn: Option<String>,
    pub price: f64,
    pub stock: i64,
    pub available: bool,
    pub publication_date: Option<String>,
    pub pages: i64,
    pub description: Option<String>,
    pub image: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub genre: Option<String>,
}

impl ImportRecord {
    /// Map a raw row onto the canonical shape, resolving field synonyms.
    pub fn from_value(raw: &Value) -> Self {
        Self {
            title: string_field(raw, &["titulo", "título", "title"]).unwrap_or_default(),
            isbn: string_field(raw, &["isbn"]),
            price: number_field(raw, &["precio", "price"]),
            stock: number_field(raw, &["stock", "cantidad", "stock_quantity"]) as i64,
            available: bool_field(raw, &["disponible", "available"]),
            publication_date: string_field(
                raw,
                &["fecha_publicacion", "fecha_publicación", "publication_date"],
            ),
            pages: number_field(raw, &["paginas", "páginas", "pages"]) as i64,
            description: string_field(raw, &["descripcion", "descripción", "description"]),
            image: string_field(raw, &["imagen", "image"]),
            author: string_field(raw, &["autor", "author"]),
            publisher: string_field(raw, &["editorial", "publisher"]),
            genre: string_field(raw, &["genero", "género", "genre"]),
        }
    }

    /// Required-field validation: non-empty title, positive price.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is required".to_string());
        }
        if self.price <= 0.0 {
            return Err("price must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Column values for the books table, lookup ids already resolved.
    pub fn to_book_data(
        &self,
        author_id: Option<&str>,
        publisher_id: Option<&str>,
        genre_id: Option<&str>,
    ) -> BTreeMap<String, Value> {
        let mut data = BTreeMap::new();
        data.insert("title".to_string(), Value::from(self.title.clone()));
        data.insert("price".to_string(), Value::from(self.price));
        data.insert("stock".to_string(), Value::from(self.stock));
        data.insert("available".to_string(), Value::from(self.available));
        data.insert("pages".to_string(), Value::from(self.pages));
        if let Some(isbn) = &self.isbn {
            data.insert("isbn".to_string(), Value::from(isbn.clone()));
        }
        if let Some(date) = &self.publication_date {
            data.insert("publication_date".to_string(), Value::from(date.clone()));
        }
        if let Some(description) = &self.description {
            data.insert("description".to_string(), Value::from(description.clone()));
        }
        if let Some(image) = &self.image {
            data.insert("image".to_string(), Value::from(image.clone()));
        }
        if let Some(id) = author_id {
            data.insert("author_id".to_string(), Value::from(id));
        }
        if let Some(id) = publisher_id {
            data.insert("publisher_id".to_string(), Value::from(id));
        }
        if let Some(id) = genre_id {
            data.insert("genre_id".to_string(), Value::from(id));
        }
        data
    }
}

/// First present synonym as a non-empty string.
fn string_field(raw: &Value, keys: &[&str]) -> Option<String> {
    let value = first_present(raw, keys)?;
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First present synonym as a number; unparsable input defaults to 0.
fn number_field(raw: &Value, keys: &[&str]) -> f64 {
    match first_present(raw, keys) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().replace(',', ".").parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Availability: true unless explicitly negative.
fn bool_field(raw: &Value, keys: &[&str]) -> bool {
    match first_present(raw, keys) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => {
            !matches!(s.trim().to_lowercase().as_str(), "false" | "no" | "falso")
        }
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        _ => true,
    }
}

fn first_present<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let obj = raw.as_object()?;
    keys.iter()
        .find_map(|key| obj.get(*key))
        .filter(|v| !v.is_null())
}
