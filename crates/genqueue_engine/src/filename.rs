use genqueue_core::Job;

const PROMPT_CHARS: usize = 30;

/// Deterministic, filesystem-safe name for output `index` of `job`:
/// `{family}_{prompt}_{id4}_{n}.mp4` with a 1-based `n`.
pub fn artifact_filename(job: &Job, index: usize) -> String {
    let prompt = sanitize_component(&job.request.prompt, PROMPT_CHARS);
    format!(
        "{}_{}_{}_{}.mp4",
        job.request.model.family(),
        prompt,
        job.id.short(),
        index + 1
    )
}

/// Keeps ASCII alphanumerics, `-` and `.`, maps everything else to `_`,
/// collapses runs of `_` and truncates to `max_len` characters.
pub fn sanitize_component(input: &str, max_len: usize) -> String {
    let mut compacted = String::with_capacity(input.len());
    let mut prev_underscore = false;
    for c in input.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
            c
        } else {
            '_'
        };
        if c == '_' {
            if !prev_underscore {
                compacted.push(c);
            }
            prev_underscore = true;
        } else {
            compacted.push(c);
            prev_underscore = false;
        }
    }

    let mut cleaned: String = compacted
        .trim_matches(&['_', '.'][..])
        .chars()
        .take(max_len)
        .collect();
    cleaned = cleaned.trim_end_matches(&['_', '.'][..]).to_string();
    if cleaned.is_empty() {
        cleaned = "untitled".to_string();
    }
    if is_reserved_windows_name(&cleaned) {
        cleaned.push('_');
    }
    cleaned
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use genqueue_core::GenerationRequest;

    #[test]
    fn prompt_is_sanitized_and_truncated() {
        assert_eq!(
            sanitize_component("A raccoon, in SPACE!! (4k)", 30),
            "A_raccoon_in_SPACE_4k"
        );
        assert_eq!(sanitize_component("abcdefghij", 4), "abcd");
        assert_eq!(sanitize_component("///", 10), "untitled");
        assert_eq!(sanitize_component("nul", 10), "nul_");
    }

    #[test]
    fn artifact_filename_is_one_based() {
        let job = Job::new(GenerationRequest::new("a fox at dawn"));
        let name = artifact_filename(&job, 0);
        assert!(name.starts_with("veo_a_fox_at_dawn_"));
        assert!(name.ends_with(&format!("{}_1.mp4", job.id.short())));
    }
}
