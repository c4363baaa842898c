//! Backward compatibility with older NN syntax releases: a conversion table
//! per versioned release rewrites legacy token streams forward.

use semver::Version;

fn renames_for(version: &Version) -> Vec<(&'static str, &'static str)> {
    let mut renames = Vec::new();
    if *version < Version::new(1, 3, 0) {
        renames.push(("$undefined", "undefined"));
    }
    if *version < Version::new(1, 6, 0) {
        // the don't-care marker used to be its own token
        renames.push(("dontcare", "undefined"));
    }
    renames
}

/// Rewrite a legacy token stream into the current alphabet.
///
/// Structural changes (`argmin`/`argmax` to sort + index) are handled by the
/// decoder itself, because their operand order changed across releases and a
/// token-level rewrite cannot express them.
pub fn apply_compatibility(tokens: Vec<String>, from_version: &Version) -> Vec<String> {
    let renames = renames_for(from_version);
    if renames.is_empty() {
        return tokens;
    }
    tokens
        .into_iter()
        .map(|token| {
            for (old, new) in &renames {
                if token == *old {
                    return new.to_string();
                }
            }
            token
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_undefined_rename() {
        let tokens: Vec<String> = [
            "now",
            "=>",
            "@com.twitter.post",
            "param:status:String",
            "=",
            "$undefined",
        ]
        .iter()
        .map(|t| t.to_string())
        .collect();
        let converted = apply_compatibility(tokens.clone(), &Version::new(1, 2, 0));
        assert_eq!(converted.last().unwrap(), "undefined");

        // current streams pass through untouched
        let untouched = apply_compatibility(tokens, &Version::new(1, 11, 0));
        assert_eq!(untouched.last().unwrap(), "$undefined");
    }
}
