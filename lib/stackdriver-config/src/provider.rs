use std::path::Path;

use figment::{
    providers::{Data, Format, Json, Yaml},
    value::{Dict, Map},
    Error, Metadata, Profile, Provider,
};

/// A provider whose data has been read and parsed eagerly.
///
/// Reading the file up front means that a bad file is reported when it is added to the loader, rather than at the
/// point where values are first extracted.
pub struct ResolvedProvider {
    data: Map<Profile, Dict>,
    metadata: Metadata,
}

impl ResolvedProvider {
    pub fn from_yaml<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        Self::from_format::<Yaml, _>(path, "YAML file")
    }

    pub fn from_json<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        Self::from_format::<Json, _>(path, "JSON file")
    }

    fn from_format<F, P>(path: P, name: &'static str) -> Result<Self, Error>
    where
        F: Format,
        P: AsRef<Path>,
    {
        let file_data = std::fs::read_to_string(path.as_ref()).map_err(|e| e.to_string())?;
        let provider: Data<F> = F::string(&file_data);
        let data = provider.data()?;

        Ok(Self {
            data,
            metadata: Metadata::from(name, path.as_ref()),
        })
    }
}

impl Provider for ResolvedProvider {
    fn metadata(&self) -> Metadata {
        self.metadata.clone()
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        Ok(self.data.clone())
    }
}
