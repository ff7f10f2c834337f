//! Interning encoder for pprof export
//!
//! Turns stack frames, labels and strings into the deduplicated
//! string/function/location tables of a pprof profile. Ids are handed out in
//! first-seen order starting at 1 (string id 0 is the empty string) and are
//! never renumbered.

use crate::pprof;
use crate::sample::{ResolvedFrame, StackFrame};
use crate::stats::StackRole;
use fnv::FnvHashMap;
use regex::Regex;
use tracing::{debug, warn};

/// Function name given to frames without a symbol
pub const UNKNOWN_FUNCTION: &str = "<unknown>";

/// Image name used when a frame carries no image
pub const UNKNOWN_IMAGE: &str = "<unknown image>";

/// Upper bound on inlined-function lines attached to one location
pub const MAX_INLINED_LINES: usize = 4;

/// Sample value columns: (type, unit)
pub const SAMPLE_TYPES: [(&str, &str); 6] = [
    ("woken", "count"),
    ("woken_dpc", "count"),
    ("woken_non_dpc", "count"),
    ("waker", "count"),
    ("waker_dpc", "count"),
    ("waker_non_dpc", "count"),
];

/// Value vector of one exported sample
pub fn sample_values(role: StackRole, in_dpc: bool) -> [i64; 6] {
    let triple = [1, i64::from(in_dpc), i64::from(!in_dpc)];
    match role {
        StackRole::Woken => [triple[0], triple[1], triple[2], 0, 0, 0],
        StackRole::Waker => [0, 0, 0, triple[0], triple[1], triple[2]],
    }
}

/// Turn `\` into `/` and strip a start-anchored prefix pattern
pub fn normalize_source_path(path: &str, prefix: Option<&Regex>) -> String {
    let normalized = path.replace('\\', "/");
    match prefix {
        Some(regex) => regex.replace(&normalized, "").into_owned(),
        None => normalized,
    }
}

/// Append-only table of distinct strings; id 0 is always ""
#[derive(Debug, Clone)]
pub struct StringTable {
    strings: Vec<String>,
    ids: FnvHashMap<String, i64>,
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StringTable {
    pub fn new() -> Self {
        let mut ids = FnvHashMap::default();
        ids.insert(String::new(), 0);
        Self {
            strings: vec![String::new()],
            ids,
        }
    }

    /// Id of `s`, inserting it when new
    pub fn intern(&mut self, s: &str) -> i64 {
        if let Some(&id) = self.ids.get(s) {
            return id;
        }
        let id = self.strings.len() as i64;
        self.strings.push(s.to_string());
        self.ids.insert(s.to_string(), id);
        id
    }

    pub fn get(&self, id: i64) -> Option<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.strings.get(index))
            .map(String::as_str)
    }

    /// Number of strings including the empty string
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        // Always holds ""
        false
    }

    fn into_vec(self) -> Vec<String> {
        self.strings
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FunctionKey {
    image: String,
    function: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LocationKey {
    process_id: u32,
    image: String,
    address: Option<u64>,
    function: String,
}

/// A label attached to a sample as if it were a stack frame
#[derive(Debug, Clone, PartialEq)]
pub struct PseudoFrame<'a> {
    pub image: &'a str,
    /// Stable id separating distinct entities that share a label
    pub address: Option<u64>,
    pub label: String,
}

/// Options that change what the encoder emits
#[derive(Debug, Clone, Default)]
pub struct EncoderOptions {
    pub include_inlined: bool,
    pub source_prefix: Option<Regex>,
}

/// Builds the interned pprof graph incrementally
#[derive(Debug, Default)]
pub struct ProfileEncoder {
    options: EncoderOptions,
    strings: StringTable,
    functions: Vec<pprof::Function>,
    function_ids: FnvHashMap<FunctionKey, u64>,
    locations: Vec<pprof::Location>,
    location_ids: FnvHashMap<LocationKey, u64>,
    samples: Vec<pprof::Sample>,
    comments: Vec<i64>,
    dropped_samples: u64,
    missing_images: u64,
}

impl ProfileEncoder {
    pub fn new(options: EncoderOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Id of a string in the string table
    pub fn string_id(&mut self, s: &str) -> i64 {
        self.strings.intern(s)
    }

    /// Id of the function `function` in `image`
    ///
    /// The source file of the first call wins. Without a source file the
    /// image name stands in as the file label.
    pub fn function_id(&mut self, image: &str, function: &str, source_file: Option<&str>) -> u64 {
        let key = FunctionKey {
            image: image.to_string(),
            function: function.to_string(),
        };
        if let Some(&id) = self.function_ids.get(&key) {
            return id;
        }

        let filename = match source_file {
            Some(file) => normalize_source_path(file, self.options.source_prefix.as_ref()),
            None => image.to_string(),
        };
        let id = self.functions.len() as u64 + 1;
        let function = pprof::Function {
            id,
            name: self.strings.intern(function),
            system_name: self.strings.intern(&format!("{}!{}", image, function)),
            filename: self.strings.intern(&filename),
        };
        self.functions.push(function);
        self.function_ids.insert(key, id);
        id
    }

    /// Id of the location of `frame` in process `process_id`
    pub fn location_id(&mut self, process_id: u32, frame: &StackFrame) -> u64 {
        match frame {
            StackFrame::Resolved(resolved) => self.resolved_location_id(process_id, resolved),
            StackFrame::Unresolved(unresolved) => {
                let image = unresolved.image.as_deref().unwrap_or(UNKNOWN_IMAGE);
                self.pseudo_location_id(process_id, image, None, UNKNOWN_FUNCTION)
            }
        }
    }

    /// Id of a code-free location carrying `label` as its function name
    pub fn pseudo_location_id(
        &mut self,
        process_id: u32,
        image: &str,
        address: Option<u64>,
        label: &str,
    ) -> u64 {
        let key = LocationKey {
            process_id,
            image: image.to_string(),
            address,
            function: label.to_string(),
        };
        if let Some(&id) = self.location_ids.get(&key) {
            return id;
        }

        let function_id = self.function_id(image, label, None);
        self.insert_location(
            key,
            address.unwrap_or(0),
            vec![pprof::Line {
                function_id,
                line: 0,
            }],
        )
    }

    fn resolved_location_id(&mut self, process_id: u32, frame: &ResolvedFrame) -> u64 {
        let image = match frame.image.as_deref() {
            Some(image) => image,
            None => {
                self.note_missing_image(&frame.function);
                UNKNOWN_IMAGE
            }
        };

        let key = LocationKey {
            process_id,
            image: image.to_string(),
            address: Some(frame.address),
            function: frame.function.clone(),
        };
        if let Some(&id) = self.location_ids.get(&key) {
            return id;
        }

        let mut lines = Vec::with_capacity(1);
        if self.options.include_inlined {
            for inlined in frame.inlined.iter().take(MAX_INLINED_LINES) {
                let function_id =
                    self.function_id(image, &inlined.function, inlined.source_file.as_deref());
                lines.push(pprof::Line {
                    function_id,
                    line: inlined.line.map_or(0, i64::from),
                });
            }
        }
        let function_id = self.function_id(image, &frame.function, frame.source_file.as_deref());
        lines.push(pprof::Line {
            function_id,
            line: frame.line.map_or(0, i64::from),
        });

        self.insert_location(key, frame.address, lines)
    }

    fn insert_location(&mut self, key: LocationKey, address: u64, lines: Vec<pprof::Line>) -> u64 {
        let id = self.locations.len() as u64 + 1;
        self.locations.push(pprof::Location {
            id,
            address,
            lines,
        });
        self.location_ids.insert(key, id);
        id
    }

    fn note_missing_image(&mut self, function: &str) {
        self.missing_images += 1;
        if self.missing_images == 1 {
            warn!(function, "stack frame has no image; using placeholder");
        } else {
            debug!(function, "stack frame has no image");
        }
    }

    /// Add a sample for `stack` followed by `labels`
    ///
    /// Returns `false` and adds nothing when the stack is empty.
    pub fn add_sample(
        &mut self,
        process_id: u32,
        stack: &[StackFrame],
        labels: &[PseudoFrame<'_>],
        values: [i64; 6],
    ) -> bool {
        if stack.is_empty() {
            self.dropped_samples += 1;
            return false;
        }

        let mut location_ids = Vec::with_capacity(stack.len() + labels.len());
        for frame in stack {
            location_ids.push(self.location_id(process_id, frame));
        }
        for label in labels {
            location_ids.push(self.pseudo_location_id(
                process_id,
                label.image,
                label.address,
                &label.label,
            ));
        }

        self.samples.push(pprof::Sample {
            location_ids,
            values: values.to_vec(),
        });
        true
    }

    /// Attach a free-text profile comment
    pub fn add_comment(&mut self, text: &str) {
        let id = self.strings.intern(text);
        self.comments.push(id);
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Samples dropped because their stack was empty
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }

    /// Finish the graph into a pprof profile
    pub fn into_profile(mut self, duration_nanos: i64) -> pprof::Profile {
        let sample_types: Vec<pprof::ValueType> = SAMPLE_TYPES
            .iter()
            .map(|(kind, unit)| pprof::ValueType {
                r#type: self.strings.intern(kind),
                unit: self.strings.intern(unit),
            })
            .collect();
        let default_sample_type = sample_types.first().map_or(0, |t| t.r#type);

        if self.missing_images > 0 {
            warn!(
                frames = self.missing_images,
                "frames without an image were exported under a placeholder"
            );
        }

        pprof::Profile {
            sample_types,
            samples: self.samples,
            locations: self.locations,
            functions: self.functions,
            string_table: self.strings.into_vec(),
            duration_nanos,
            comment: self.comments,
            default_sample_type,
        }
    }
}
