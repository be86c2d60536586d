//! Interpretation of raw build/deploy tool output.
//!
//! The cloud CLI is the only source of truth for the deployed service URL,
//! and it decorates its output with ANSI color codes (both full `ESC[..m`
//! sequences and, once the escape byte is lost in transit, bare `[..m`
//! fragments). Everything that reads subprocess text funnels through here.

/// Marker line printed by the cloud CLI in front of the deployed URL.
pub const SERVICE_URL_MARKER: &str = "Service URL:";

/// Remove ANSI SGR color sequences from a line.
///
/// Handles the full form `ESC [ digits/; m` and the degraded form
/// `[ digits/; m` without the escape byte. Other bracket text (such as
/// `[INFO]`) is left untouched.
pub fn strip_ansi(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        // Full escape sequence: ESC [ ... m
        if c == '\u{1b}' && matches!(chars.get(i + 1), Some('[')) {
            if let Some(end) = sgr_end(&chars, i + 2) {
                i = end + 1;
                continue;
            }
            // ESC followed by '[' but no SGR terminator: drop the escape
            // byte itself and let the remainder pass through.
            i += 1;
            continue;
        }

        // Degraded sequence without the escape byte: [ ... m
        if c == '[' {
            if let Some(end) = sgr_end(&chars, i + 1) {
                i = end + 1;
                continue;
            }
        }

        out.push(c);
        i += 1;
    }

    out
}

/// Index of the terminating `m` when `chars[start..]` begins with an SGR
/// parameter body (digits and semicolons only).
fn sgr_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start;
    while let Some(&c) = chars.get(i) {
        match c {
            '0'..='9' | ';' => i += 1,
            'm' => return Some(i),
            _ => return None,
        }
    }
    None
}

/// Incremental scanner that captures the first `Service URL:` occurrence
/// across an entire multi-stage output stream.
#[derive(Debug, Default)]
pub struct UrlScanner {
    found: Option<String>,
}

impl UrlScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect one output line. Only the first match is kept.
    pub fn observe(&mut self, line: &str) {
        if self.found.is_some() {
            return;
        }
        let clean = strip_ansi(line.trim());
        if let Some(url) = extract_service_url(&clean) {
            self.found = Some(url);
        }
    }

    /// The captured URL, re-stripped once more in case any color fragment
    /// survived inside the captured token.
    pub fn into_url(self) -> Option<String> {
        self.found.map(|url| strip_ansi(&url))
    }
}

/// Pull the URL token out of a clean `Service URL: https://...` line.
fn extract_service_url(line: &str) -> Option<String> {
    let idx = line.find(SERVICE_URL_MARKER)?;
    let rest = line[idx + SERVICE_URL_MARKER.len()..].trim_start();
    let token: String = rest.chars().take_while(|c| !c.is_whitespace()).collect();
    if token.starts_with("http://") || token.starts_with("https://") {
        Some(token)
    } else {
        None
    }
}

/// Whether infra-setup output indicates resources that already exist.
///
/// Setup is idempotent in intent but its tooling reports re-creation of
/// an existing registry or service account as a hard error; those runs
/// are treated as success.
pub fn is_already_exists(output: &str) -> bool {
    output.contains("ALREADY_EXISTS") || output.to_lowercase().contains("already exists")
}
