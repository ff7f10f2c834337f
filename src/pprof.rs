//! Wire messages of the pprof `profile.proto` format
//!
//! Only the fields the exporter fills are declared. Decoders skip unknown
//! tags, so the tag numbers below are all that must match
//! `perftools.profiles.Profile`. Every `i64` that names a string is an index
//! into `Profile::string_table`.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Profile {
    #[prost(message, repeated, tag = "1")]
    pub sample_types: Vec<ValueType>,
    #[prost(message, repeated, tag = "2")]
    pub samples: Vec<Sample>,
    #[prost(message, repeated, tag = "4")]
    pub locations: Vec<Location>,
    #[prost(message, repeated, tag = "5")]
    pub functions: Vec<Function>,
    /// Entry 0 is always ""
    #[prost(string, repeated, tag = "6")]
    pub string_table: Vec<String>,
    #[prost(int64, tag = "10")]
    pub duration_nanos: i64,
    #[prost(int64, repeated, tag = "13")]
    pub comment: Vec<i64>,
    #[prost(int64, tag = "14")]
    pub default_sample_type: i64,
}

/// Column header of the sample value vectors
#[derive(Clone, Copy, PartialEq, Eq, ::prost::Message)]
pub struct ValueType {
    #[prost(int64, tag = "1")]
    pub r#type: i64,
    #[prost(int64, tag = "2")]
    pub unit: i64,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Sample {
    /// Leaf first
    #[prost(uint64, repeated, tag = "1")]
    pub location_ids: Vec<u64>,
    #[prost(int64, repeated, tag = "2")]
    pub values: Vec<i64>,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Location {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(uint64, tag = "3")]
    pub address: u64,
    /// Inlined callees first, the frame's own function last
    #[prost(message, repeated, tag = "4")]
    pub lines: Vec<Line>,
}

#[derive(Clone, Copy, PartialEq, Eq, ::prost::Message)]
pub struct Line {
    #[prost(uint64, tag = "1")]
    pub function_id: u64,
    #[prost(int64, tag = "2")]
    pub line: i64,
}

#[derive(Clone, Copy, PartialEq, Eq, ::prost::Message)]
pub struct Function {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(int64, tag = "2")]
    pub name: i64,
    /// `image!function`
    #[prost(int64, tag = "3")]
    pub system_name: i64,
    #[prost(int64, tag = "4")]
    pub filename: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_profile_encode_decode() {
        let profile = Profile {
            string_table: vec![String::new(), "main".to_string()],
            functions: vec![Function {
                id: 1,
                name: 1,
                system_name: 1,
                filename: 0,
            }],
            locations: vec![Location {
                id: 1,
                address: 0x40,
                lines: vec![Line {
                    function_id: 1,
                    line: 7,
                }],
            }],
            ..Profile::default()
        };
        let bytes = profile.encode_to_vec();
        let decoded = Profile::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, profile);
    }

    #[test]
    fn test_tags_match_profile_proto() {
        // Profile.string_table is field 6, length delimited
        let profile = Profile {
            string_table: vec![String::new()],
            ..Profile::default()
        };
        assert_eq!(profile.encode_to_vec(), vec![0x32, 0x00]);

        // Profile.duration_nanos is field 10, varint
        let profile = Profile {
            duration_nanos: 1,
            ..Profile::default()
        };
        assert_eq!(profile.encode_to_vec(), vec![0x50, 0x01]);
    }
}
