//! Corpus acquisition and per-corpus context models.
//!
//! A `CorpusLoader` turns a source identifier into the full byte stream or
//! fails; there are no partial corpora. Each loaded corpus owns its own
//! frozen `MarkovModel`.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use tracing::info;

use crate::error::{AutobyteError, Result};
use crate::markov::MarkovModel;

/// Source of raw corpus bytes.
pub trait CorpusLoader {
    fn load(&self, source_id: &str) -> Result<Vec<u8>>;
}

/// Reads sources as files under a root directory. A name resolves to itself,
/// then to `name.gz`, then to `name.bz2`. `.gz` files are gunzipped, `.bz2`
/// files are bunzipped, anything else is read raw.
#[derive(Clone, Debug)]
pub struct DirCorpusLoader {
    root: PathBuf,
}

impl DirCorpusLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirCorpusLoader { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, source_id: &str) -> Result<PathBuf> {
        let direct = self.root.join(source_id);
        if direct.is_file() {
            return Ok(direct);
        }
        for ext in ["gz", "bz2"] {
            let packed = self.root.join(format!("{source_id}.{ext}"));
            if packed.is_file() {
                return Ok(packed);
            }
        }
        Err(AutobyteError::SourceNotFound {
            source_id: source_id.to_string(),
            root: self.root.clone(),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Compression {
    None,
    Gzip,
    Bzip2,
}

fn compression_of(path: &Path) -> Compression {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("gz") => Compression::Gzip,
        Some("bz2") => Compression::Bzip2,
        _ => Compression::None,
    }
}

impl CorpusLoader for DirCorpusLoader {
    fn load(&self, source_id: &str) -> Result<Vec<u8>> {
        let path = self.resolve(source_id)?;
        let mut reader = BufReader::new(File::open(&path)?);
        let mut data = Vec::new();
        match compression_of(&path) {
            Compression::Gzip => GzDecoder::new(reader).read_to_end(&mut data)?,
            Compression::Bzip2 => BzDecoder::new(reader).read_to_end(&mut data)?,
            Compression::None => reader.read_to_end(&mut data)?,
        };
        if data.is_empty() {
            return Err(AutobyteError::EmptyCorpus(source_id.to_string()));
        }
        Ok(data)
    }
}

/// One loaded source: its bytes and the context tables built from them.
#[derive(Clone, Debug)]
pub struct Corpus {
    pub name: String,
    pub data: Vec<u8>,
    pub model: MarkovModel,
}

impl Corpus {
    pub fn build(name: impl Into<String>, data: Vec<u8>, order: usize, alphabet: usize) -> Result<Self> {
        let name = name.into();
        let model = MarkovModel::from_bytes(order, alphabet, &data)?;
        info!(
            corpus = %name,
            bytes = data.len(),
            contexts = model.num_contexts(order - 1),
            "corpus loaded"
        );
        Ok(Corpus { name, data, model })
    }
}

/// Load and model every source in order. The first failure aborts.
pub fn load_all(
    loader: &dyn CorpusLoader,
    sources: &[String],
    order: usize,
    alphabet: usize,
) -> Result<Vec<Corpus>> {
    sources
        .iter()
        .map(|id| Corpus::build(id.as_str(), loader.load(id)?, order, alphabet))
        .collect()
}
