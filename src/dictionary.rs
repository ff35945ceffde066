//
// dictionary.rs
// dicom-veil
//
// Static catalog of identifying DICOM attributes, each pre-classified into an anonymization action.
//

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VeilError};

/// Treatment assigned to an identifying field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    /// Replace with a non-zero-length dummy value.
    Dummy,
    /// Replace with a zero-length or dummy value.
    ZeroOrDummy,
    /// Remove the element entirely.
    Remove,
    // Reserved kinds: part of the vocabulary, no catalog member uses them yet.
    Keep,
    Clean,
    Unique,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionKind::Dummy => "DUMMY",
            ActionKind::ZeroOrDummy => "ZERO_OR_DUMMY",
            ActionKind::Remove => "REMOVE",
            ActionKind::Keep => "KEEP",
            ActionKind::Clean => "CLEAN",
            ActionKind::Unique => "UNIQUE",
        };
        f.pad(label)
    }
}

/// Row of the fixed hexadecimal table the catalog is built from.
struct HexEntry {
    key: TagKey,
    display_name: &'static str,
    group_hex: &'static str,
    element_hex: &'static str,
    action: ActionKind,
}

// Declares `TagKey` and the hex table together so their orders can never drift apart.
macro_rules! tag_catalog {
    ($( $key:ident => ($display:literal, $group:literal, $element:literal, $action:ident) ),+ $(,)?) => {
        /// Symbolic key of a recognized identifying field.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum TagKey {
            $($key),+
        }

        impl TagKey {
            /// Every key, in catalog order.
            pub const ALL: &'static [TagKey] = &[$(TagKey::$key),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(TagKey::$key => stringify!($key)),+
                }
            }
        }

        const HEX_TABLE: &[HexEntry] = &[
            $(HexEntry {
                key: TagKey::$key,
                display_name: $display,
                group_hex: $group,
                element_hex: $element,
                action: ActionKind::$action,
            }),+
        ];
    };
}

tag_catalog! {
    // Replaced by dummy data
    PatientName => ("Patient's Name", "0010", "0010", Dummy),
    PatientID => ("Patient ID", "0010", "0020", Dummy),
    ContentDate => ("Content Date", "0008", "0023", Dummy),
    ContentTime => ("Content Time", "0008", "0033", Dummy),
    ContentCreatorName => ("Content Creator's Name", "0070", "0084", Dummy),
    VerifyingObserverName => ("Verifying Observer Name", "0040", "A075", Dummy),
    PersonName => ("Person Name", "0040", "A123", Dummy),
    GraphicAnnotationText => ("Unformatted Text Value", "0070", "0006", Dummy),
    InstitutionName => ("Institution Name", "0008", "0080", Dummy),

    // Replaced by zero-length or dummy data
    PatientBirthDate => ("Patient's Birth Date", "0010", "0030", ZeroOrDummy),
    PatientSex => ("Patient's Sex", "0010", "0040", ZeroOrDummy),
    StudyDate => ("Study Date", "0008", "0020", ZeroOrDummy),
    StudyTime => ("Study Time", "0008", "0030", ZeroOrDummy),
    AccessionNumber => ("Accession Number", "0008", "0050", ZeroOrDummy),
    ReferringPhysicianName => ("Referring Physician's Name", "0008", "0090", ZeroOrDummy),
    StudyID => ("Study ID", "0020", "0010", ZeroOrDummy),
    ContrastBolusAgent => ("Contrast/Bolus Agent", "0018", "0010", ZeroOrDummy),

    // Removed
    InstitutionAddress => ("Institution Address", "0008", "0081", Remove),
    ReferringPhysicianAddress => ("Referring Physician's Address", "0008", "0092", Remove),
    ReferringPhysicianTelephoneNumbers => ("Referring Physician's Telephone Numbers", "0008", "0094", Remove),
    StationName => ("Station Name", "0008", "1010", Remove),
    StudyDescription => ("Study Description", "0008", "1030", Remove),
    SeriesDescription => ("Series Description", "0008", "103E", Remove),
    InstitutionalDepartmentName => ("Institutional Department Name", "0008", "1040", Remove),
    PhysiciansOfRecord => ("Physician(s) of Record", "0008", "1048", Remove),
    PerformingPhysicianName => ("Performing Physician's Name", "0008", "1050", Remove),
    NameOfPhysiciansReadingStudy => ("Name of Physician(s) Reading Study", "0008", "1060", Remove),
    OperatorsName => ("Operators' Name", "0008", "1070", Remove),
    AdmittingDiagnosesDescription => ("Admitting Diagnoses Description", "0008", "1080", Remove),
    DerivationDescription => ("Derivation Description", "0008", "2111", Remove),
    IssuerOfPatientID => ("Issuer of Patient ID", "0010", "0021", Remove),
    PatientBirthTime => ("Patient's Birth Time", "0010", "0032", Remove),
    OtherPatientIDs => ("Other Patient IDs", "0010", "1000", Remove),
    OtherPatientNames => ("Other Patient Names", "0010", "1001", Remove),
    PatientAge => ("Patient's Age", "0010", "1010", Remove),
    PatientSize => ("Patient's Size", "0010", "1020", Remove),
    PatientWeight => ("Patient's Weight", "0010", "1030", Remove),
    PatientAddress => ("Patient's Address", "0010", "1040", Remove),
    PatientMotherBirthName => ("Patient's Mother's Birth Name", "0010", "1060", Remove),
    MilitaryRank => ("Military Rank", "0010", "1080", Remove),
    BranchOfService => ("Branch of Service", "0010", "1081", Remove),
    MedicalRecordLocator => ("Medical Record Locator", "0010", "1090", Remove),
    CountryOfResidence => ("Country of Residence", "0010", "2150", Remove),
    RegionOfResidence => ("Region of Residence", "0010", "2152", Remove),
    PatientTelephoneNumbers => ("Patient's Telephone Numbers", "0010", "2154", Remove),
    EthnicGroup => ("Ethnic Group", "0010", "2160", Remove),
    Occupation => ("Occupation", "0010", "2180", Remove),
    AdditionalPatientHistory => ("Additional Patient History", "0010", "21B0", Remove),
    ResponsiblePerson => ("Responsible Person", "0010", "2297", Remove),
    PatientComments => ("Patient Comments", "0010", "4000", Remove),
    DeviceSerialNumber => ("Device Serial Number", "0018", "1000", Remove),
    ProtocolName => ("Protocol Name", "0018", "1030", Remove),
    ImageComments => ("Image Comments", "0020", "4000", Remove),
    RequestAttributesSequence => ("Request Attributes Sequence", "0040", "0275", Remove),
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TagKey {
    type Err = VeilError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        TagKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| VeilError::UnknownTag(s.to_string()))
    }
}

/// Catalog entry: a field, its numeric address inside the container, and its action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagDescriptor {
    pub key: TagKey,
    pub display_name: &'static str,
    pub group: u16,
    pub element: u16,
    pub action: ActionKind,
}

impl TagDescriptor {
    fn from_hex(entry: &HexEntry) -> Result<Self> {
        Ok(Self {
            key: entry.key,
            display_name: entry.display_name,
            group: parse_hex_u16(entry.group_hex)?,
            element: parse_hex_u16(entry.element_hex)?,
            action: entry.action,
        })
    }

    /// `(GGGG,EEEE)` notation.
    pub fn address(&self) -> String {
        format!("({},{})", to_hex(self.group), to_hex(self.element))
    }
}

lazy_static! {
    static ref CATALOG: Vec<TagDescriptor> = HEX_TABLE
        .iter()
        .map(TagDescriptor::from_hex)
        .collect::<Result<Vec<_>>>()
        .expect("static tag table holds only valid hexadecimal addresses");
}

impl TagKey {
    pub fn descriptor(self) -> &'static TagDescriptor {
        // Enum discriminants follow table order.
        &CATALOG[self as usize]
    }
}

/// Parses a hexadecimal string (`0-9a-fA-F`, no prefix) into a 16-bit value.
pub fn parse_hex_u16(hex: &str) -> Result<u16> {
    if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(VeilError::InvalidHex(hex.to_string()));
    }
    u16::from_str_radix(hex, 16).map_err(|_| VeilError::InvalidHex(hex.to_string()))
}

pub fn to_hex(value: u16) -> String {
    format!("{:04X}", value)
}

/// Returns the descriptors for `keys`, or the whole catalog when `keys` is `None` or empty.
pub fn dictionary(keys: Option<&[TagKey]>) -> Vec<&'static TagDescriptor> {
    match keys {
        Some(keys) if !keys.is_empty() => keys.iter().map(|key| key.descriptor()).collect(),
        _ => CATALOG.iter().collect(),
    }
}

/// Descriptors grouped by the three active action kinds.
#[derive(Debug, Default, Clone)]
pub struct ActionSets {
    pub dummy: Vec<&'static TagDescriptor>,
    pub zero_or_dummy: Vec<&'static TagDescriptor>,
    pub remove: Vec<&'static TagDescriptor>,
}

pub fn partition(descriptors: &[&'static TagDescriptor]) -> ActionSets {
    let mut sets = ActionSets::default();
    for &descriptor in descriptors {
        match descriptor.action {
            ActionKind::Dummy => sets.dummy.push(descriptor),
            ActionKind::ZeroOrDummy => sets.zero_or_dummy.push(descriptor),
            ActionKind::Remove => sets.remove.push(descriptor),
            ActionKind::Keep | ActionKind::Clean | ActionKind::Unique => {}
        }
    }
    sets
}
