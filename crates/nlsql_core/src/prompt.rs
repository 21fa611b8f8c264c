//! Prompt text for synthesis and repair.
//!
//! The policy block is the contract with the backend: read intents produce
//! exactly one SELECT, deletion vocabulary produces the destructive statement
//! as asked, and the output is a single ```sql block without prose. Nothing
//! here tries to prevent destructive SQL from being generated, blocking it is
//! left to the safety filter.

use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::memory::ContextBlock;
use crate::schema::SchemaDescription;

/// Deserializes through [`FromStr`], so `"EN"` and `"english"` are accepted
/// the same way they are on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Language {
    #[default]
    #[serde(rename = "tr")]
    Turkish,
    #[serde(rename = "en")]
    English,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Turkish => "tr",
            Language::English => "en",
        }
    }

    /// Warning returned when the synthesized statement is blocked.
    pub fn blocked_warning(&self) -> &'static str {
        match self {
            Language::Turkish => {
                "Bu sorgu güvenlik nedeniyle engellendi (destructive SQL tespit edildi)."
            }
            Language::English => "This query was blocked for safety (destructive SQL detected).",
        }
    }

    /// Warning returned when the repaired statement is blocked.
    pub fn repair_blocked_warning(&self) -> &'static str {
        match self {
            Language::Turkish => "Düzeltilen SQL destructive olduğu için engellendi.",
            Language::English => "The repaired SQL was blocked because it is destructive.",
        }
    }

    fn labels(&self) -> &'static Labels {
        match self {
            Language::Turkish => &TURKISH_LABELS,
            Language::English => &ENGLISH_LABELS,
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tr" | "turkish" => Ok(Language::Turkish),
            "en" | "english" => Ok(Language::English),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

struct Labels {
    prev_question: &'static str,
    prev_sql: &'static str,
    prev_result: &'static str,
    prev_error: &'static str,
    current_question: &'static str,
    repair_user: &'static str,
}

static TURKISH_LABELS: Labels = Labels {
    prev_question: "ÖNCEKİ SORU",
    prev_sql: "ÖNCEKİ ÜRETİLEN SQL",
    prev_result: "ÖNCEKİ SONUÇ",
    prev_error: "ÖNCEKİ HATA",
    current_question: "ŞİMDİKİ SORU",
    repair_user: "Lütfen hatayı düzeltilmiş yeni SQL sorgusunu yaz.",
};

static ENGLISH_LABELS: Labels = Labels {
    prev_question: "PREVIOUS QUESTION",
    prev_sql: "PREVIOUS GENERATED SQL",
    prev_result: "PREVIOUS RESULT",
    prev_error: "PREVIOUS ERROR",
    current_question: "CURRENT QUESTION",
    repair_user: "Please write the corrected SQL query.",
};

const TURKISH_POLICY: &str = r#"===========================================================
KESİN VE DEĞİŞTİRİLEMEZ TALİMATLAR
===========================================================

1) Kullanıcı SELECT türü bir soru sorarsa:
   → SADECE tek bir SELECT sorgusu üret.

2) Kullanıcı aşağıdaki kelimelerden birini kullanırsa:
   "sil", "tabloyu sil", "kaldır",
   "delete", "drop", "truncate",
   "her şeyi sil", "tümünü sil"

   → MUTLAKA destructive SQL üret:
     - DELETE FROM ...
     - DROP TABLE ...
     - TRUNCATE TABLE ...

   ASLA SELECT ile değiştirme.
   ASLA açıklama ekleme.
   ASLA uyarı veya yorum satırı ekleme.
   SADECE saf SQL çıktısı üret.

   ÖRNEK:
   "products tablosunu sil" → DROP TABLE products;
   "products içindeki tüm ürünleri sil" → DELETE FROM products;

3) Çıktı formatı:
   → HER ZAMAN tek bir ```sql ... ``` bloğu içinde OLACAK.

4) Join gerektiğinde doğru foreign key'leri kullan.

5) Tahmin edemiyorsan en mantıklı SQL'i üret.

===========================================================

Lütfen sadece saf SQL çıktısı üret."#;

const ENGLISH_POLICY: &str = r#"===========================================================
STRICT AND NON-NEGOTIABLE RULES
===========================================================

1) If the user asks a read question:
   → produce exactly ONE SELECT statement.

2) If the user uses any of these words:
   "sil", "tabloyu sil", "kaldır",
   "delete", "drop", "truncate",
   "her şeyi sil", "tümünü sil", "remove", "delete everything"

   → you MUST produce the destructive SQL:
     - DELETE FROM ...
     - DROP TABLE ...
     - TRUNCATE TABLE ...

   NEVER replace it with a SELECT.
   NEVER add explanations.
   NEVER add warnings or comment lines.
   Output ONLY plain SQL.

   EXAMPLE:
   "drop the products table" → DROP TABLE products;
   "delete all rows in products" → DELETE FROM products;

3) Output format:
   → ALWAYS inside a single ```sql ... ``` block.

4) Use the correct foreign keys when a join is needed.

5) If unsure, produce the most plausible SQL.

===========================================================

Output only plain SQL."#;

/// System instruction for synthesis: role, schema and the policy block.
pub fn system_prompt(schema: &SchemaDescription, language: Language) -> String {
    match language {
        Language::Turkish => format!(
            "Sen bir PostgreSQL uzmanısın ve e-ticaret veritabanı için SQL sorguları üretiyorsun.\n\nElindeki veritabanı şeması:\n\n{schema}\n{TURKISH_POLICY}\n"
        ),
        Language::English => format!(
            "You are a PostgreSQL expert writing SQL queries for an e-commerce database.\n\nThe database schema:\n\n{schema}\n{ENGLISH_POLICY}\n"
        ),
    }
}

/// Render the context block. Values are written verbatim.
pub fn context_block(context: &ContextBlock, language: Language) -> String {
    let labels = language.labels();
    let mut out = String::new();
    let fields = [
        (labels.prev_question, &context.question),
        (labels.prev_sql, &context.sql),
        (labels.prev_result, &context.result_preview),
        (labels.prev_error, &context.error),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            // Writing to a string doesn't fail.
            let _ = writeln!(out, "{label}: {value}");
        }
    }
    out
}

/// User message for synthesis: optional context block followed by the current
/// (normalized) question.
pub fn user_message(context: Option<&ContextBlock>, question: &str, language: Language) -> String {
    let labels = language.labels();
    match context.filter(|c| !c.is_empty()) {
        Some(context) => format!(
            "{}\n{}: {question}",
            context_block(context, language),
            labels.current_question
        ),
        None => format!("{}: {question}", labels.current_question),
    }
}

/// System instruction for repairing a statement that failed to execute.
pub fn repair_prompt(
    question: &str,
    failed_sql: &str,
    error_message: &str,
    language: Language,
) -> String {
    match language {
        Language::Turkish => format!(
            "Aşağıda PostgreSQL için üretilmiş bir SQL sorgusu var, fakat hata verdi.\n\nOrijinal Türkçe soru:\n{question}\n\nÜretilen SQL:\n{failed_sql}\n\nHata mesajı:\n{error_message}\n\nGörevin:\n- Bu hatayı düzelten, geçerli ve çalışan YENİ bir SQL sorgusu üret.\n- Yine sadece SELECT sorgusu yaz.\n- Yine ```sql ... ``` bloğu içinde ver.\n"
        ),
        Language::English => format!(
            "Below is a SQL query generated for PostgreSQL that failed.\n\nOriginal question:\n{question}\n\nGenerated SQL:\n{failed_sql}\n\nError message:\n{error_message}\n\nYour task:\n- Produce a NEW valid SQL query that fixes this error.\n- Again, write only a SELECT query.\n- Again, put it inside a ```sql ... ``` block.\n"
        ),
    }
}

pub fn repair_user_message(language: Language) -> &'static str {
    language.labels().repair_user
}
