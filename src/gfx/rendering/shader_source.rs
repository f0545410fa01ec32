//! Combined shader sources
//!
//! One `.wgsl` file per pass, split into stages by `#shader` tag lines:
//!
//! ```text
//! #shader common     (optional, prepended to every stage)
//! #shader vertex
//! #shader fragment   (optional for depth-only passes)
//! ```

use crate::error::ShaderError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderStages {
    pub vertex: String,
    pub fragment: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Common,
    Vertex,
    Fragment,
}

/// Splits a tagged combined source into per-stage WGSL
pub fn split_stages(label: &str, source: &str) -> Result<ShaderStages, ShaderError> {
    let bad = |message: String| ShaderError::BadSource {
        label: label.to_string(),
        message,
    };

    let mut section = Section::Preamble;
    let mut common = String::new();
    let mut vertex: Option<String> = None;
    let mut fragment: Option<String> = None;

    for (line_number, line) in source.lines().enumerate() {
        if let Some(tag) = line.trim().strip_prefix("#shader") {
            section = match tag.trim() {
                "common" if vertex.is_none() && fragment.is_none() => Section::Common,
                "common" => return Err(bad(format!("line {}: common section after a stage", line_number + 1))),
                "vertex" if vertex.is_none() => Section::Vertex,
                "fragment" if fragment.is_none() => Section::Fragment,
                "vertex" | "fragment" => {
                    return Err(bad(format!("line {}: duplicate '{}' section", line_number + 1, tag.trim())))
                }
                other => return Err(bad(format!("line {}: unknown stage '{}'", line_number + 1, other))),
            };
            match section {
                Section::Vertex => vertex = Some(String::new()),
                Section::Fragment => fragment = Some(String::new()),
                _ => {}
            }
            continue;
        }

        let target = match section {
            Section::Preamble => {
                if line.trim().is_empty() || line.trim_start().starts_with("//") {
                    continue;
                }
                return Err(bad(format!("line {}: code before the first #shader tag", line_number + 1)));
            }
            Section::Common => Some(&mut common),
            Section::Vertex => vertex.as_mut(),
            Section::Fragment => fragment.as_mut(),
        };
        if let Some(target) = target {
            target.push_str(line);
            target.push('\n');
        }
    }

    let vertex = vertex.ok_or_else(|| bad("missing vertex section".to_string()))?;
    Ok(ShaderStages {
        vertex: format!("{}{}", common, vertex),
        fragment: fragment.map(|fragment| format!("{}{}", common, fragment)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_prelude_is_prepended_to_each_stage() {
        let source = "// pass\n#shader common\nconst K: f32 = 1.0;\n#shader vertex\nfn vs() {}\n#shader fragment\nfn fs() {}\n";
        let stages = split_stages("test", source).unwrap();
        assert_eq!(stages.vertex, "const K: f32 = 1.0;\nfn vs() {}\n");
        assert_eq!(stages.fragment.as_deref(), Some("const K: f32 = 1.0;\nfn fs() {}\n"));
    }

    #[test]
    fn depth_only_source_has_no_fragment_stage() {
        let stages = split_stages("depth", "#shader vertex\nfn vs() {}\n").unwrap();
        assert!(stages.fragment.is_none());
    }

    #[test]
    fn malformed_sources_are_rejected() {
        for source in [
            "fn stray() {}\n#shader vertex\n",
            "#shader fragment\nfn fs() {}\n",
            "#shader vertex\n#shader vertex\n",
            "#shader geometry\n",
            "#shader vertex\n#shader common\n",
        ] {
            assert!(
                matches!(split_stages("bad", source), Err(ShaderError::BadSource { .. })),
                "accepted {:?}",
                source
            );
        }
    }
}
