//! Record and amendment sources

use anyhow::Context;
use biosamples_common::types::Amendment;
use biosamples_common::Result;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::io::BufRead;
use std::marker::PhantomData;

/// Amendments recorded against samples
pub trait AmendmentSource: Send + Sync {
    fn amendments_for(&self, accession: &str) -> Result<Vec<Amendment>>;
}

/// Process-local [`AmendmentSource`]
#[derive(Debug, Default)]
pub struct InMemoryAmendmentSource {
    by_sample: HashMap<String, Vec<Amendment>>,
}

impl InMemoryAmendmentSource {
    pub fn new(amendments: impl IntoIterator<Item = Amendment>) -> Self {
        let mut by_sample: HashMap<String, Vec<Amendment>> = HashMap::new();
        for amendment in amendments {
            by_sample
                .entry(amendment.sample.clone())
                .or_default()
                .push(amendment);
        }
        Self { by_sample }
    }

    pub fn len(&self) -> usize {
        self.by_sample.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_sample.is_empty()
    }
}

impl AmendmentSource for InMemoryAmendmentSource {
    fn amendments_for(&self, accession: &str) -> Result<Vec<Amendment>> {
        Ok(self.by_sample.get(accession).cloned().unwrap_or_default())
    }
}

/// Lazily decodes one JSON value per line.
///
/// Blank lines are skipped. A read error or malformed line is yielded as an
/// error carrying the line number.
pub struct JsonLines<R, T> {
    reader: R,
    line: usize,
    buf: String,
    _record: PhantomData<fn() -> T>,
}

impl<R: BufRead, T: DeserializeOwned> JsonLines<R, T> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: String::new(),
            _record: PhantomData,
        }
    }
}

impl<R: BufRead, T: DeserializeOwned> Iterator for JsonLines<R, T> {
    type Item = anyhow::Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            self.line += 1;
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {},
                Err(e) => {
                    return Some(Err(e).with_context(|| format!("failed to read line {}", self.line)))
                },
            }
            let trimmed = self.buf.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(trimmed)
                    .with_context(|| format!("malformed record on line {}", self.line)),
            );
        }
    }
}
