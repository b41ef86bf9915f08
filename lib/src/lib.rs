use std::fs::File;
use std::io::BufReader;

use memmap::MmapOptions;

use crate::serialization::{read_sketch_file, JsonSketch, JSON_EXT, KMH_EXT};

pub mod distance;
pub mod errors;
pub mod host;
pub mod merge;
pub mod pool;
pub mod serialization;
pub mod sketch_schemes;

pub use crate::errors::{KmhError, KmhResult};
pub use crate::host::Engine;
pub use crate::pool::{PoolConfig, Pools};
pub use crate::sketch_schemes::kmv::KmvSketch;
pub use crate::sketch_schemes::SketchParams;

/// Load a sketch from a `.kmh` (binary) or `.json` file.
pub fn open_sketch_file(filename: &str, pools: &Pools) -> KmhResult<KmvSketch> {
    let file = File::open(filename).map_err(|_| format_err!("Error opening {}", &filename))?;
    if filename.ends_with(KMH_EXT) {
        let mut buf_reader = BufReader::new(file);
        read_sketch_file(&mut buf_reader, pools)
    } else if filename.ends_with(JSON_EXT) {
        // zero-length files can't be mapped
        if file.metadata()?.len() == 0 {
            bail!("Error parsing {}: file is empty", filename);
        }
        let mapped = unsafe { MmapOptions::new().map(&file)? };
        let sketch: JsonSketch = serde_json::from_slice(&mapped)
            .map_err(|_| format_err!("Error parsing {}", &filename))?;
        sketch.to_sketch(pools)
    } else {
        Err(format_err!("File suffix is not *{} or *{}", KMH_EXT, JSON_EXT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::write_sketch_file;
    use std::io::Write;

    fn sample(pools: &Pools) -> KmvSketch {
        let mut sketch = KmvSketch::new(SketchParams::new(16, 100_000, 42), pools).unwrap();
        sketch.extend(0..40);
        sketch
    }

    #[test]
    fn test_open_binary_and_json() -> Result<(), Box<dyn std::error::Error>> {
        let pools = Pools::default();
        let sketch = sample(&pools);
        let dir = tempfile::tempdir()?;

        let binary = dir.path().join("sample.kmh");
        write_sketch_file(&mut File::create(&binary)?, &sketch, &pools)?;
        let loaded = open_sketch_file(binary.to_str().unwrap(), &pools)?;
        assert_eq!(loaded, sketch);

        let json = dir.path().join("sample.json");
        let mut out = File::create(&json)?;
        serde_json::to_writer(&mut out, &JsonSketch::new("sample", &sketch))?;
        out.flush()?;
        let loaded = open_sketch_file(json.to_str().unwrap(), &pools)?;
        assert_eq!(loaded, sketch);

        Ok(())
    }

    #[test]
    fn test_open_rejects_bad_files() -> Result<(), Box<dyn std::error::Error>> {
        let pools = Pools::default();
        let dir = tempfile::tempdir()?;
        assert!(open_sketch_file("/nonexistent/sketch.kmh", &pools).is_err());

        let empty = dir.path().join("empty.json");
        File::create(&empty)?;
        assert!(open_sketch_file(empty.to_str().unwrap(), &pools).is_err());

        let short = dir.path().join("short.kmh");
        File::create(&short)?.write_all(&[1, 2, 3])?;
        match open_sketch_file(short.to_str().unwrap(), &pools) {
            Err(KmhError::Truncated { needed, actual }) => {
                assert_eq!(needed, 16);
                assert_eq!(actual, 3);
            }
            other => panic!("expected truncation, got {:?}", other),
        }

        let unknown = dir.path().join("sketch.txt");
        File::create(&unknown)?;
        assert!(open_sketch_file(unknown.to_str().unwrap(), &pools).is_err());
        Ok(())
    }
}
