use std::fs;
use std::path::Path;

use serde::{Serialize, Deserialize, de::DeserializeOwned};

use crate::layer::{Activation, Dense};
use crate::model::Sequential;
use crate::tensor::Tensor;
use crate::scalar::{Inner, Real};


/// Everything that can go wrong talking to the filesystem.
///
/// Math and model-building mistakes are programmer errors and panic
/// instead; only IO and file-format problems surface as results.

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("could not encode model: {0}")]
  Encode(postcard::Error),
  #[error("could not decode model: {0}")]
  Decode(postcard::Error),
  #[error("{0}")]
  Format(String),
}

pub type Result<T> = std::result::Result<T, Error>;


const MAGIC: [u8; 4] = *b"FFLW";
const FORMAT_VERSION: u16 = 1;


/// Header of a saved model file.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
  pub name: String,
  pub format_version: u16,
  pub crate_version: String,
  /// Element type of the stored weights, e.g. `"f32"`.
  pub dtype: String,
}

#[derive(Serialize, Deserialize)]
struct LayerRecord<T: Inner> {
  name: String,
  activation: Activation,
  weights: Tensor<T>,
  bias: Tensor<T>,
}

#[derive(Serialize, Deserialize)]
struct ModelFile<T: Inner> {
  meta: Metadata,
  layers: Vec<LayerRecord<T>>,
}


/// Read just the [Metadata] of a saved model, without loading weights.

pub fn read_metadata(path: impl AsRef<Path>) -> Result<Metadata> {
  let bytes = fs::read(path)?;
  let payload = check_magic(&bytes)?;
  // Metadata is the leading field of the file record, so a prefix
  // decode recovers it without knowing the weight type
  let (meta, _) = postcard::take_from_bytes::<Metadata>(payload).map_err(Error::Decode)?;
  Ok(meta)
}

fn check_magic(bytes: &[u8]) -> Result<&[u8]> {
  if bytes.len() < MAGIC.len() || bytes[..MAGIC.len()] != MAGIC {
    return Err(Error::Format("Not a ferroflow model file".into()))
  }
  Ok(&bytes[MAGIC.len()..])
}

impl<T: Real + Serialize + DeserializeOwned> Sequential<T> {
  /// Write the model to a file: metadata first, then one record per
  /// layer with detached weight copies.

  pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
    let dump = ModelFile {
      meta: Metadata {
        name: self.name().to_string(),
        format_version: FORMAT_VERSION,
        crate_version: env!("CARGO_PKG_VERSION").to_string(),
        dtype: std::any::type_name::<T>().to_string(),
      },
      layers: self.layers().iter()
        .map(|layer| LayerRecord {
          name: layer.name().to_string(),
          activation: layer.activation(),
          weights: layer.weights().data().detach(),
          bias: layer.bias().data().detach(),
        })
        .collect(),
    };
    let payload = postcard::to_allocvec(&dump).map_err(Error::Encode)?;
    let mut bytes = MAGIC.to_vec();
    bytes.extend(payload);
    fs::write(path, bytes)?;
    Ok(())
  }

  /// Rebuild a model saved with [save](Sequential::save). The loaded
  /// model predicts exactly like the one that was written.

  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let bytes = fs::read(path)?;
    let payload = check_magic(&bytes)?;
    let dump: ModelFile<T> = postcard::from_bytes(payload).map_err(Error::Decode)?;

    if dump.meta.format_version > FORMAT_VERSION {
      return Err(Error::Format(format!(
        "Model format version {} is newer than supported version {FORMAT_VERSION}",
        dump.meta.format_version)))
    }
    if dump.meta.dtype != std::any::type_name::<T>() {
      return Err(Error::Format(format!(
        "Model stores {} weights, not {}", dump.meta.dtype, std::any::type_name::<T>())))
    }

    let mut model = Sequential::named(dump.meta.name);
    let mut previous: Option<usize> = None;
    for record in dump.layers {
      if record.weights.rank() != 2
        || record.bias.dims() != &[record.weights.dims()[1]]
        || previous.is_some_and(|units| units != record.weights.dims()[0] )
      {
        return Err(Error::Format(format!("Layer {} has inconsistent shapes", record.name)))
      }
      previous = Some(record.weights.dims()[1]);
      model.add(Dense::from_parts(record.name, record.weights, record.bias, record.activation));
    }
    Ok(model)
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::layer::Activation::*;
  use crate::model::Model;

  fn model() -> Sequential<f32> {
    Sequential::named("roundtrip")
      .dense(4, 8, Relu)
      .dense(8, 1, Linear)
  }

  #[test]
  fn save_load_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.ffw");

    let original = model();
    original.save(&path).unwrap();
    let loaded = Sequential::<f32>::load(&path).unwrap();

    assert_eq!(loaded.name(), "roundtrip");
    assert_eq!(loaded.layers().len(), 2);
    assert_eq!(loaded.layers()[0].activation(), Relu);

    let x = Tensor::randn(&[5, 4]);
    assert!(loaded.predict(&x).allclose(&original.predict(&x), 1e-6));
  }

  #[test]
  fn metadata_survives() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.ffw");
    model().save(&path).unwrap();

    let meta = read_metadata(&path).unwrap();
    assert_eq!(meta.name, "roundtrip");
    assert_eq!(meta.format_version, FORMAT_VERSION);
    assert_eq!(meta.dtype, "f32");
  }

  #[test]
  fn rejects_foreign_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-a-model");
    fs::write(&path, b"something else").unwrap();

    assert!(matches!(Sequential::<f32>::load(&path), Err(Error::Format(_))));
  }

  #[test]
  fn rejects_wrong_dtype() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.ffw");
    model().save(&path).unwrap();

    assert!(matches!(Sequential::<f64>::load(&path), Err(Error::Format(_))));
  }

  #[test]
  fn rejects_truncated_payload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.ffw");
    model().save(&path).unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
    assert!(Sequential::<f32>::load(&path).is_err());
  }

  #[test]
  fn missing_file_is_io_error() {
    assert!(matches!(Sequential::<f32>::load("/nonexistent/model.ffw"), Err(Error::Io(_))));
  }
}
