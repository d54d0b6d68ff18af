//! Names and locations of layer files.
//!
//! Every file name is a list of `key-value` fields joined by dots plus an
//! extension, e.g. `sum-0012.max_value-3.vbyte`. Sums are zero-padded
//! decimals; max values are hex digits. Keys map to paths through pure
//! functions so every stage agrees on the layout.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::engine::State;
use crate::serialization::{read_states, write_atomically, CodecError, LayerPartInfo};

/// Kind of per-part file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartFile {
    States,
    Info,
    Values,
    Policy,
    QValues,
}

impl PartFile {
    pub fn extension(self) -> &'static str {
        match self {
            PartFile::States => "vbyte",
            PartFile::Info => "json",
            PartFile::Values => "values",
            PartFile::Policy => "policy",
            PartFile::QValues => "qvalues",
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        Some(match ext {
            "vbyte" => PartFile::States,
            "json" => PartFile::Info,
            "values" => PartFile::Values,
            "policy" => PartFile::Policy,
            "qvalues" => PartFile::QValues,
            _ => return None,
        })
    }
}

/// A layer part: all states with the same tile sum and maximum exponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerPartKey {
    pub sum: u32,
    pub max_value: u8,
}

impl LayerPartKey {
    pub fn new(sum: u32, max_value: u8) -> Self {
        Self { sum, max_value }
    }

    pub fn of<const N: usize>(state: State<N>) -> Self {
        Self { sum: state.sum(), max_value: state.max_value() }
    }

    pub fn file_name(&self, kind: PartFile) -> String {
        format!("sum-{:04}.max_value-{:x}.{}", self.sum, self.max_value, kind.extension())
    }

    pub fn parse(name: &str) -> Option<(Self, PartFile)> {
        let (fields, ext) = split_fields(name)?;
        match fields.as_slice() {
            [("sum", sum), ("max_value", max)] => Some((
                Self { sum: sum.parse().ok()?, max_value: u8::from_str_radix(max, 16).ok()? },
                PartFile::from_extension(ext)?,
            )),
            _ => None,
        }
    }

    /// Parts that successors of this part can land in: sum + 2 or 4, max
    /// value unchanged or one higher.
    pub fn successor_keys(&self) -> [LayerPartKey; 4] {
        [
            Self::new(self.sum + 2, self.max_value),
            Self::new(self.sum + 2, self.max_value + 1),
            Self::new(self.sum + 4, self.max_value),
            Self::new(self.sum + 4, self.max_value + 1),
        ]
    }
}

/// One sorted fragment written by a tranche worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FragmentKey {
    pub input: LayerPartKey,
    pub output: LayerPartKey,
    pub remainder: u32,
    pub fragment: u32,
}

impl FragmentKey {
    pub fn file_name(&self) -> String {
        format!(
            "input_sum-{:04}.input_max_value-{:x}.output_sum-{:04}.output_max_value-{:x}.remainder-{:02}.fragment-{:04}.vbyte",
            self.input.sum,
            self.input.max_value,
            self.output.sum,
            self.output.max_value,
            self.remainder,
            self.fragment
        )
    }

    pub fn parse(name: &str) -> Option<Self> {
        let (fields, ext) = split_fields(name)?;
        if ext != "vbyte" {
            return None;
        }
        match fields.as_slice() {
            [("input_sum", is), ("input_max_value", im), ("output_sum", os), ("output_max_value", om), ("remainder", r), ("fragment", f)] => {
                Some(Self {
                    input: LayerPartKey::new(is.parse().ok()?, u8::from_str_radix(im, 16).ok()?),
                    output: LayerPartKey::new(os.parse().ok()?, u8::from_str_radix(om, 16).ok()?),
                    remainder: r.parse().ok()?,
                    fragment: f.parse().ok()?,
                })
            }
            _ => None,
        }
    }
}

/// One unit of builder work: a contiguous range of an input part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrancheKey {
    pub input: LayerPartKey,
    pub remainder: u32,
}

impl TrancheKey {
    /// Name of the manifest the worker writes when it finishes.
    pub fn file_name(&self) -> String {
        format!(
            "input_sum-{:04}.input_max_value-{:x}.remainder-{:02}.json",
            self.input.sum, self.input.max_value, self.remainder
        )
    }

    pub fn parse(name: &str) -> Option<Self> {
        let (fields, ext) = split_fields(name)?;
        if ext != "json" {
            return None;
        }
        match fields.as_slice() {
            [("input_sum", is), ("input_max_value", im), ("remainder", r)] => Some(Self {
                input: LayerPartKey::new(is.parse().ok()?, u8::from_str_radix(im, 16).ok()?),
                remainder: r.parse().ok()?,
            }),
            _ => None,
        }
    }

    pub fn fragment(&self, output: LayerPartKey, fragment: u32) -> FragmentKey {
        FragmentKey { input: self.input, output, remainder: self.remainder, fragment }
    }
}

/// Written by a tranche worker when it finishes: how many fragments it left
/// for each output part. Compaction trusts only tranches with a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrancheManifest {
    pub tranche: TrancheKey,
    pub input_states: u64,
    pub outputs: Vec<TrancheOutput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrancheOutput {
    pub part: LayerPartKey,
    pub fragments: u32,
}

impl TrancheManifest {
    pub fn fragments_for(&self, part: LayerPartKey) -> u32 {
        self.outputs.iter().find(|o| o.part == part).map_or(0, |o| o.fragments)
    }

    pub fn fragment_keys(&self, part: LayerPartKey) -> impl Iterator<Item = FragmentKey> + '_ {
        (0..self.fragments_for(part)).map(move |n| self.tranche.fragment(part, n))
    }

    pub fn write(&self, path: &Path) -> Result<(), CodecError> {
        write_atomically(path, |w| {
            serde_json::to_writer_pretty(&mut *w, self)?;
            Ok(())
        })
    }

    pub fn read(path: &Path) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(&std::fs::read(path)?)?)
    }
}

fn split_fields(name: &str) -> Option<(Vec<(&str, &str)>, &str)> {
    let (stem, ext) = name.rsplit_once('.')?;
    let fields = stem.split('.').map(|f| f.split_once('-')).collect::<Option<Vec<_>>>()?;
    Some((fields, ext))
}

/// A directory of layer files: parts, fragments and tranche manifests for a
/// model, or value and policy files for a solution.
#[derive(Debug, Clone)]
pub struct LayerFolder {
    root: PathBuf,
}

impl LayerFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let folder = Self::new(root);
        std::fs::create_dir_all(&folder.root)?;
        Ok(folder)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn part_path(&self, key: LayerPartKey, kind: PartFile) -> PathBuf {
        self.root.join(key.file_name(kind))
    }

    pub fn fragment_path(&self, key: &FragmentKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    pub fn tranche_path(&self, key: &TrancheKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    fn file_names(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_owned());
                }
            }
        }
        Ok(names)
    }

    /// Sorted keys of all parts that have a file of `kind`.
    pub fn parts(&self, kind: PartFile) -> io::Result<Vec<LayerPartKey>> {
        let mut keys: Vec<LayerPartKey> = self
            .file_names()?
            .iter()
            .filter_map(|n| LayerPartKey::parse(n))
            .filter(|(_, k)| *k == kind)
            .map(|(key, _)| key)
            .collect();
        keys.sort();
        Ok(keys)
    }

    pub fn parts_with_sum(&self, sum: u32) -> io::Result<Vec<LayerPartKey>> {
        Ok(self.parts(PartFile::States)?.into_iter().filter(|k| k.sum == sum).collect())
    }

    /// Distinct layer sums with a states file, ascending.
    pub fn layer_sums(&self) -> io::Result<Vec<u32>> {
        let mut sums: Vec<u32> = self.parts(PartFile::States)?.iter().map(|k| k.sum).collect();
        sums.dedup();
        Ok(sums)
    }

    pub fn fragments(&self) -> io::Result<Vec<FragmentKey>> {
        let mut keys: Vec<FragmentKey> =
            self.file_names()?.iter().filter_map(|n| FragmentKey::parse(n)).collect();
        keys.sort();
        Ok(keys)
    }

    pub fn tranches(&self) -> io::Result<Vec<TrancheKey>> {
        let mut keys: Vec<TrancheKey> =
            self.file_names()?.iter().filter_map(|n| TrancheKey::parse(n)).collect();
        keys.sort();
        Ok(keys)
    }

    pub fn read_info(&self, key: LayerPartKey) -> Result<LayerPartInfo, CodecError> {
        LayerPartInfo::read(&self.part_path(key, PartFile::Info))
    }

    pub fn read_states(&self, key: LayerPartKey) -> Result<Vec<u64>, CodecError> {
        read_states(&self.part_path(key, PartFile::States))
    }

    pub fn read_manifest(&self, key: &TrancheKey) -> Result<TrancheManifest, CodecError> {
        TrancheManifest::read(&self.tranche_path(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn part_names() {
        let key = LayerPartKey::new(12, 10);
        assert_eq!(key.file_name(PartFile::States), "sum-0012.max_value-a.vbyte");
        assert_eq!(key.file_name(PartFile::Values), "sum-0012.max_value-a.values");
        assert_eq!(LayerPartKey::parse("sum-0012.max_value-a.json"), Some((key, PartFile::Info)));
        assert_eq!(LayerPartKey::parse("sum-0012.max_value-a.txt"), None);
        assert_eq!(LayerPartKey::parse("input_sum-0012.remainder-00.json"), None);
    }

    #[test]
    fn fragment_and_tranche_names() {
        let tranche = TrancheKey { input: LayerPartKey::new(4, 1), remainder: 3 };
        let frag = tranche.fragment(LayerPartKey::new(8, 2), 17);
        let name = frag.file_name();
        assert_eq!(
            name,
            "input_sum-0004.input_max_value-1.output_sum-0008.output_max_value-2.remainder-03.fragment-0017.vbyte"
        );
        assert_eq!(FragmentKey::parse(&name), Some(frag));
        assert_eq!(tranche.file_name(), "input_sum-0004.input_max_value-1.remainder-03.json");
        assert_eq!(TrancheKey::parse(&tranche.file_name()), Some(tranche));
        assert_eq!(FragmentKey::parse("sum-0004.max_value-1.vbyte"), None);
    }

    #[test]
    fn folder_lists_parts_by_kind() {
        let dir = tempdir().unwrap();
        let folder = LayerFolder::create(dir.path().join("layers")).unwrap();
        for key in [LayerPartKey::new(6, 2), LayerPartKey::new(4, 1), LayerPartKey::new(6, 1)] {
            fs::write(folder.part_path(key, PartFile::States), b"").unwrap();
        }
        fs::write(folder.part_path(LayerPartKey::new(4, 1), PartFile::Info), b"{}").unwrap();
        let frag = TrancheKey { input: LayerPartKey::new(4, 1), remainder: 0 }
            .fragment(LayerPartKey::new(6, 1), 0);
        fs::write(folder.fragment_path(&frag), b"").unwrap();

        assert_eq!(
            folder.parts(PartFile::States).unwrap(),
            vec![LayerPartKey::new(4, 1), LayerPartKey::new(6, 1), LayerPartKey::new(6, 2)]
        );
        assert_eq!(folder.parts(PartFile::Info).unwrap(), vec![LayerPartKey::new(4, 1)]);
        assert_eq!(folder.parts_with_sum(6).unwrap(), vec![LayerPartKey::new(6, 1), LayerPartKey::new(6, 2)]);
        assert_eq!(folder.layer_sums().unwrap(), vec![4, 6]);
        assert_eq!(folder.fragments().unwrap(), vec![frag]);
        assert!(folder.tranches().unwrap().is_empty());
    }

    #[test]
    fn manifests_list_fragments_per_output() {
        let dir = tempdir().unwrap();
        let folder = LayerFolder::create(dir.path()).unwrap();
        let tranche = TrancheKey { input: LayerPartKey::new(4, 1), remainder: 1 };
        let manifest = TrancheManifest {
            tranche,
            input_states: 3,
            outputs: vec![
                TrancheOutput { part: LayerPartKey::new(6, 1), fragments: 2 },
                TrancheOutput { part: LayerPartKey::new(8, 2), fragments: 1 },
            ],
        };
        manifest.write(&folder.tranche_path(&tranche)).unwrap();
        assert_eq!(folder.tranches().unwrap(), vec![tranche]);
        assert!(folder.parts(PartFile::Info).unwrap().is_empty());
        let read = folder.read_manifest(&tranche).unwrap();
        assert_eq!(read, manifest);
        assert_eq!(read.fragments_for(LayerPartKey::new(8, 1)), 0);
        let keys: Vec<FragmentKey> = read.fragment_keys(LayerPartKey::new(6, 1)).collect();
        assert_eq!(keys, vec![tranche.fragment(LayerPartKey::new(6, 1), 0), tranche.fragment(LayerPartKey::new(6, 1), 1)]);
    }
}
