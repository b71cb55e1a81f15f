use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Bundled libraries a unit can pull in with `Library "<path>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LibraryId {
    Defender,
    Core,
    Ads,
}

impl LibraryId {
    /// Order in which resolved libraries are appended to a program.
    pub const EMISSION_ORDER: [LibraryId; 3] = [LibraryId::Defender, LibraryId::Core, LibraryId::Ads];

    pub fn path(self) -> &'static str {
        match self {
            Self::Defender => "v30/bslDefender.brs",
            Self::Core => "v30/bslCore.brs",
            Self::Ads => "Roku_Ads.brs",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        Self::EMISSION_ORDER
            .into_iter()
            .find(|library| library.path().eq_ignore_ascii_case(path.trim()))
    }

    pub fn source(self) -> &'static str {
        match self {
            Self::Defender => include_str!("../../libraries/v30/bslDefender.brs"),
            Self::Core => include_str!("../../libraries/v30/bslCore.brs"),
            Self::Ads => include_str!("../../libraries/Roku_Ads.brs"),
        }
    }
}

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// Library flags accumulated from the successfully compiled units of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LibraryRequests {
    pub defender: bool,
    pub core: bool,
    pub ads: bool,
}

impl LibraryRequests {
    pub fn request(&mut self, library: LibraryId) {
        match library {
            LibraryId::Defender => self.defender = true,
            LibraryId::Core => self.core = true,
            LibraryId::Ads => self.ads = true,
        }
    }

    pub fn extend(&mut self, libraries: &BTreeSet<LibraryId>) {
        for library in libraries {
            self.request(*library);
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.defender || self.core || self.ads)
    }

    /// Defender depends on Core. Each library appears at most once, in
    /// `EMISSION_ORDER`.
    pub fn resolve(self) -> Vec<LibraryId> {
        let core = self.core || self.defender;
        LibraryId::EMISSION_ORDER
            .into_iter()
            .filter(|library| match library {
                LibraryId::Defender => self.defender,
                LibraryId::Core => core,
                LibraryId::Ads => self.ads,
            })
            .collect()
    }
}
