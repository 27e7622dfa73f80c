use std::ops::Index;
use std::slice;

use crate::meta::{DataProcessing, FileDescription, Software};

use super::spectrum_types::{Spectrum, SpectrumLike};

/// An in-memory run: its file level metadata and its spectra in file order
#[derive(Debug, Default, Clone)]
pub struct SpectrumCollection {
    pub run_id: String,
    pub file_description: FileDescription,
    pub softwares: Vec<Software>,
    pub data_processings: Vec<DataProcessing>,
    pub spectra: Vec<Spectrum>,
}

impl SpectrumCollection {
    pub fn new<S: Into<String>>(run_id: S) -> Self {
        Self {
            run_id: run_id.into(),
            ..Default::default()
        }
    }

    /// Wrap a single spectrum in a collection of its own
    pub fn from_spectrum(spectrum: Spectrum) -> Self {
        let mut inst = Self::new("run");
        inst.push(spectrum);
        inst
    }

    /// Copy the metadata of `self` without its spectra
    pub fn empty_like(&self) -> Self {
        Self {
            run_id: self.run_id.clone(),
            file_description: self.file_description.clone(),
            softwares: self.softwares.clone(),
            data_processings: self.data_processings.clone(),
            spectra: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Spectrum> {
        self.spectra.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Spectrum> {
        self.spectra.get_mut(index)
    }

    pub fn get_spectrum_by_id(&self, id: &str) -> Option<&Spectrum> {
        self.spectra.iter().find(|s| s.id() == id)
    }

    pub fn push(&mut self, spectrum: Spectrum) {
        self.spectra.push(spectrum)
    }

    pub fn iter(&self) -> slice::Iter<'_, Spectrum> {
        self.spectra.iter()
    }

    pub fn iter_mut(&mut self) -> slice::IterMut<'_, Spectrum> {
        self.spectra.iter_mut()
    }

    /// Add a software entry unless one with the same id is already present
    pub fn add_software(&mut self, software: Software) {
        if !self.softwares.iter().any(|s| s.id == software.id) {
            self.softwares.push(software);
        }
    }
}

impl Index<usize> for SpectrumCollection {
    type Output = Spectrum;

    fn index(&self, index: usize) -> &Self::Output {
        &self.spectra[index]
    }
}

impl<'a> IntoIterator for &'a SpectrumCollection {
    type Item = &'a Spectrum;
    type IntoIter = slice::Iter<'a, Spectrum>;

    fn into_iter(self) -> Self::IntoIter {
        self.spectra.iter()
    }
}

impl IntoIterator for SpectrumCollection {
    type Item = Spectrum;
    type IntoIter = std::vec::IntoIter<Spectrum>;

    fn into_iter(self) -> Self::IntoIter {
        self.spectra.into_iter()
    }
}

impl FromIterator<Spectrum> for SpectrumCollection {
    fn from_iter<T: IntoIterator<Item = Spectrum>>(iter: T) -> Self {
        Self {
            spectra: iter.into_iter().collect(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::spectrum::SpectrumDescription;

    fn make_spectrum(id: &str, index: usize) -> Spectrum {
        Spectrum::from_arrays(
            SpectrumDescription::new(id, index, 1),
            &[100.0, 101.0],
            &[1.0, 2.0],
        )
        .unwrap()
    }

    #[test]
    fn test_access() {
        let mut collection = SpectrumCollection::new("run1");
        assert!(collection.is_empty());
        collection.push(make_spectrum("scan=1", 0));
        collection.push(make_spectrum("scan=2", 1));
        assert_eq!(collection.len(), 2);
        assert_eq!(collection[1].id(), "scan=2");
        assert_eq!(collection.get_spectrum_by_id("scan=1").unwrap().index(), 0);
        assert!(collection.get_spectrum_by_id("scan=3").is_none());
        assert!(collection.get(2).is_none());
        let ids: Vec<&str> = collection.iter().map(|s| s.id()).collect();
        assert_eq!(ids, ["scan=1", "scan=2"]);

        let single = SpectrumCollection::from_spectrum(make_spectrum("scan=9", 0));
        assert_eq!(single.len(), 1);

        collection.add_software(Software::mzkit());
        collection.add_software(Software::mzkit());
        assert_eq!(collection.softwares.len(), 1);
        let meta_only = collection.empty_like();
        assert!(meta_only.is_empty());
        assert_eq!(meta_only.run_id, "run1");
    }
}
