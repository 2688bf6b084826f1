//! Graphviz DOT debug dumps (spec.md §4.6), grounded in
//! `original_source/src/debug_tools.py`'s `write_to_dot`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::fst::Transducer;

/// The default directory debug dumps are written under, matching the
/// original's `OUT_DIR`.
pub const DEFAULT_OUT_DIR: &str = "out";

/// Renders `transducer` as a named DOT graph and writes it to
/// `<out_dir>/<name>.dot`, creating `out_dir` if it does not exist.
/// Returns the path written to.
pub fn write_to_dot(transducer: &Transducer, out_dir: &Path, name: &str) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)?;
    let path = out_dir.join(format!("{name}.dot"));
    fs::write(&path, transducer.to_dot(name))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fst::{Arc, CostVector};

    #[test]
    fn writes_a_dot_file_under_the_given_directory() {
        let dir = std::env::temp_dir().join(format!("otml-dot-test-{:?}", std::thread::current().id()));
        let mut t = Transducer::new(Vec::new(), 0);
        let q = t.set_as_single_state();
        t.add_arc(Arc::new(q, crate::features::Segment::joker(), crate::features::Segment::joker(), CostVector::empty(), q))
            .unwrap();

        let path = write_to_dot(&t, &dir, "example").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("digraph example"));

        fs::remove_dir_all(&dir).ok();
    }
}
