#![no_main]

use idlewake::analysis::IdleWakeupAnalyzer;
use idlewake::config::AnalysisConfig;
use idlewake::input::parse_sample_line;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Convert arbitrary bytes to UTF-8 string (lossy conversion)
    if let Ok(input) = std::str::from_utf8(data) {
        // Parsing and analyzing a sample must not panic regardless of input
        if let Ok(Some(sample)) = parse_sample_line(input) {
            if let Ok(mut analyzer) = IdleWakeupAnalyzer::new(&AnalysisConfig::default()) {
                analyzer.process(&sample);
                let _ = analyzer.finish("fuzz");
            }
        }
    }
});
