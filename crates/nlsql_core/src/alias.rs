//! Rewriting of domain vocabulary into schema identifiers.

use std::path::Path;

use tracing::trace;

use crate::errors::{NlSqlError, Result};

/// Rewrites a user question before it reaches the prompt.
pub trait QuestionNormalizer: Send + Sync {
    fn normalize(&self, question: &str) -> String;
}

/// Static phrase to identifier mapping.
///
/// Phrases are stored lower-cased and must be unique. Replacement runs in
/// table order, every phrase found in the (already rewritten) question has
/// all of its occurrences replaced. There is no longest-match rule, a short
/// phrase that appears inside a longer word is replaced as well.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    entries: Vec<(String, String)>,
}

impl AliasTable {
    pub fn try_new<I, P, C>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let mut table = AliasTable::default();
        for (phrase, ident) in entries {
            let phrase = phrase.into().to_lowercase();
            if phrase.is_empty() {
                return Err(NlSqlError::AliasTable("empty alias phrase".to_string()));
            }
            if table.entries.iter().any(|(p, _)| *p == phrase) {
                return Err(NlSqlError::AliasTable(format!(
                    "duplicate alias phrase: {phrase}"
                )));
            }
            table.entries.push((phrase, ident.into()));
        }
        Ok(table)
    }

    /// Load a table from a json object of `"phrase": "identifier"` pairs.
    /// Key order in the file is the replacement order.
    pub fn from_json(json: &str) -> Result<Self> {
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
        let entries = map
            .into_iter()
            .map(|(phrase, ident)| match ident {
                serde_json::Value::String(ident) => Ok((phrase, ident)),
                other => Err(NlSqlError::AliasTable(format!(
                    "identifier for '{phrase}' must be a string, got {other}"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        Self::try_new(entries)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Column vocabulary for the e-commerce schema the service ships with.
    pub fn ecommerce() -> Self {
        let entries = ECOMMERCE_ALIASES
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect();
        AliasTable { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }
}

impl QuestionNormalizer for AliasTable {
    fn normalize(&self, question: &str) -> String {
        normalize(question, self)
    }
}

/// Lower-case `question` and replace every alias phrase it contains.
pub fn normalize(question: &str, aliases: &AliasTable) -> String {
    let mut q = question.to_lowercase();
    for (phrase, ident) in aliases.iter() {
        if q.contains(phrase) {
            trace!(%phrase, %ident, "replacing alias");
            q = q.replace(phrase, ident);
        }
    }
    q
}

const ECOMMERCE_ALIASES: &[(&str, &str)] = &[
    // customers
    ("müşteri adı", "name"),
    ("müşteri ismi", "name"),
    ("müşteri mail", "email"),
    ("mail", "email"),
    ("telefon", "phone"),
    ("cinsiyet", "gender"),
    ("doğum tarihi", "birth_date"),
    ("kayıt tarihi", "register_date"),
    // addresses
    ("adres", "address_line"),
    ("şehir", "city"),
    ("il", "city"),
    ("ülke", "country"),
    ("posta kodu", "postal_code"),
    // products
    ("ürün adı", "name"),
    ("ürün fiyatı", "price"),
    ("ürün açıklaması", "description"),
    ("stok", "stock"),
    ("ürün puanı", "rating"),
    ("kategori", "category_id"),
    ("marka", "brand_id"),
    // categories
    ("kategori adı", "category_name"),
    ("üst kategori", "parent_category_id"),
    // brands
    ("marka adı", "brand_name"),
    // orders
    ("sipariş tarihi", "order_date"),
    ("kargolama tarihi", "ship_date"),
    ("sipariş durumu", "status"),
    ("kargo adresi", "shipping_address_id"),
    // order items
    ("adet", "quantity"),
    ("miktar", "quantity"),
    ("liste fiyatı", "list_price"),
    ("indirim", "discount_amount"),
    // payments
    ("ödeme tarihi", "payment_date"),
    ("ödeme yöntemi", "payment_method"),
    ("ödeme tutarı", "amount"),
    ("tutar", "amount"),
    // reviews
    ("yorum", "comment"),
    ("yorum tarihi", "review_date"),
    ("puan", "rating"),
    // suppliers
    ("tedarikçi", "supplier_id"),
    ("tedarikçi fiyatı", "cost_price"),
    // shippers
    ("kargo şirketi", "shipper_id"),
    ("kargo firması", "shipper_name"),
    ("kargo takip numarası", "tracking_number"),
    // shipments
    ("gönderi tarihi", "shipment_date"),
    ("kargo maliyeti", "freight_cost"),
];
