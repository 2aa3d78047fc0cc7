use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

use crate::util::Hexify;
use crate::AddressRange;
use crate::Error;
use crate::Result;


/// The build id of a binary, as raw bytes.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BuildId {
    raw: Box<[u8]>,
}

impl BuildId {
    /// Create a build id from raw bytes.
    #[inline]
    pub fn from_raw(raw: impl Into<Vec<u8>>) -> Self {
        Self {
            raw: raw.into().into_boxed_slice(),
        }
    }

    /// Create a build id from its hexadecimal representation.
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() % 2 != 0 {
            return Err(Error::with_invalid_input(format!(
                "build id `{hex}` has an odd number of digits"
            )))
        }

        let digits = hex
            .bytes()
            .map(|c| match c {
                b'0'..=b'9' => Ok(c - b'0'),
                b'a'..=b'f' => Ok(c - b'a' + 10),
                b'A'..=b'F' => Ok(c - b'A' + 10),
                _ => Err(Error::with_invalid_input(format!(
                    "build id `{hex}` is not valid hex"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        let raw = digits
            .chunks_exact(2)
            .map(|pair| (pair[0] << 4) | pair[1])
            .collect::<Vec<_>>();
        Ok(Self::from_raw(raw))
    }

    /// Retrieve the raw bytes of the build id.
    #[inline]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Format the build id as lower case hexadecimal string.
    pub fn to_hex(&self) -> String {
        self.raw.iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

impl Debug for BuildId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_tuple("BuildId")
            .field(&Hexify(self.raw.as_ref()))
            .finish()
    }
}

impl Display for BuildId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.to_hex())
    }
}


/// The parameters describing a memory mapping to create.
///
/// Two parameter sets are equal only if all their fields are.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CreateMappingParams {
    /// The address range covered by the mapping.
    pub memory_range: AddressRange,
    /// The offset into the backing file at which the mapping starts.
    pub exact_offset: u64,
    /// The offset of the first page of the mapping.
    pub start_offset: u64,
    /// The bias between addresses in the binary and in memory.
    pub load_bias: u64,
    /// The name of the mapping.
    pub name: String,
    /// The build id of the backing binary, if known.
    pub build_id: Option<BuildId>,
}

impl CreateMappingParams {
    /// Create parameters for a mapping of `memory_range` called `name`,
    /// with all offsets zero and no build id.
    pub fn new(memory_range: AddressRange, name: impl Into<String>) -> Self {
        Self {
            memory_range,
            exact_offset: 0,
            start_offset: 0,
            load_bias: 0,
            name: name.into(),
            build_id: None,
        }
    }

    /// Set the build id.
    #[inline]
    pub fn with_build_id(mut self, build_id: BuildId) -> Self {
        self.build_id = Some(build_id);
        self
    }

    /// Set the file offsets.
    #[inline]
    pub fn with_offsets(mut self, exact_offset: u64, start_offset: u64) -> Self {
        self.exact_offset = exact_offset;
        self.start_offset = start_offset;
        self
    }

    /// Set the load bias.
    #[inline]
    pub fn with_load_bias(mut self, load_bias: u64) -> Self {
        self.load_bias = load_bias;
        self
    }
}


/// Create a mapping name from the components of its path.
///
/// Components are joined with `/`. A leading `/` is added unless the
/// first component already starts with one, as is the case for
/// profilers that report the full path as a single component.
pub fn make_mapping_name<S>(components: &[S]) -> String
where
    S: AsRef<str>,
{
    let mut name = String::new();
    for (idx, component) in components.iter().enumerate() {
        let component = component.as_ref();
        if idx != 0 || !component.starts_with('/') {
            name.push('/');
        }
        name.push_str(component);
    }
    name
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;

    use crate::ErrorKind;

    use test_log::test;


    /// Exercise the hex conversion of build ids.
    #[test]
    fn build_id_hex() {
        let build_id = BuildId::from_hex("00deadBEEF").unwrap();
        assert_eq!(build_id.raw(), &[0x00, 0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(build_id.to_hex(), "00deadbeef");
        assert_eq!(build_id.to_string(), "00deadbeef");
        assert_eq!(format!("{build_id:?}"), "BuildId([0x0, 0xde, 0xad, 0xbe, 0xef])");

        let err = BuildId::from_hex("abc").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = BuildId::from_hex("zz").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(BuildId::from_hex("").unwrap().raw(), &[] as &[u8]);
    }

    /// Check that parameters compare equal only if all fields do.
    #[test]
    fn params_identity() {
        let range = AddressRange::new(0x1000, 0x2000);
        let params = CreateMappingParams::new(range, "/lib/libfoo.so");

        let mut set = HashSet::new();
        assert!(set.insert(params.clone()));
        assert!(!set.insert(params.clone()));
        assert!(set.insert(params.clone().with_load_bias(0x100)));
        assert!(set.insert(params.clone().with_offsets(0x1000, 0)));
        assert!(set.insert(params.with_build_id(BuildId::from_raw([1, 2]))));
    }

    /// Check that mapping names get assembled properly.
    #[test]
    fn mapping_names() {
        assert_eq!(make_mapping_name::<&str>(&[]), "");
        assert_eq!(make_mapping_name(&["usr", "lib", "libc.so.6"]), "/usr/lib/libc.so.6");
        assert_eq!(make_mapping_name(&["/system/lib64/libart.so"]), "/system/lib64/libart.so");
        assert_eq!(make_mapping_name(&["/data", "app.apk"]), "/data/app.apk");
    }
}
