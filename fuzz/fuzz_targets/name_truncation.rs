#![no_main]

use blockprof::name::FixedName;
use blockprof::track::Track;
use blockprof::BlockIdentity;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let input = String::from_utf8_lossy(data);

    // Truncation must land on a char boundary and never exceed capacity
    let mut name = FixedName::<16>::new("");
    let truncated = name.set(&input);
    assert!(name.len() <= 16);
    assert!(input.starts_with(name.as_str()));
    assert_eq!(truncated, name.len() < input.len());

    let mut formatted = FixedName::<16>::new("");
    formatted.set_fmt(format_args!("{}:{}", input, data.len()));
    assert!(formatted.len() <= 16);

    // Every line number resolves to a distinct slot until the table fills
    let mut track = Track::<8>::new();
    let mut seen = [false; 8];
    for (line, _) in data.iter().take(8).enumerate() {
        let identity = BlockIdentity::new("fuzz.rs", line as u32, "site");
        let slot = track.resolve(identity).unwrap();
        assert!(!seen[slot]);
        seen[slot] = true;
        assert_eq!(track.locate(identity), Some(slot));
    }
});
