//! Media identifier parsing and fallback query synthesis.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use tracing::{debug, warn};

use super::types::{Catalog, MediaId, MediaKind, NormalizeError, QueryHints, SearchQuery};

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(19|20)\d{2}").unwrap());

/// Release noise stripped from filename-derived titles. Everything from the
/// first match onward is dropped: `Heat.1995.1080p.BluRay.x264-GRP` → `Heat`.
static RELEASE_NOISE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b((19|20)\d{2}|2160p|1080p|720p|480p|4k|uhd|blu-?ray|b[dr]rip|dvdrip|remux|web-?dl|webrip|hdtv|x26[45]|h\.?26[45]|hevc|av1|xvid|divx|hdr10?\+?|10bit|aac|ac3|dts|atmos|proper|repack|extended|unrated|multi)\b",
    )
    .unwrap()
});

/// Extract the first plausible 4-digit release year from free text.
pub fn extract_year(text: &str) -> Option<u16> {
    YEAR_RE
        .find(text)
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .filter(|y| (1900..=2099).contains(y))
}

/// Parse a raw media identifier, tolerating one or two rounds of URL
/// encoding (`tt0369179%3A1%3A2`, `tt0369179%253A1%253A2`).
pub fn parse_media_id(raw_id: &str) -> MediaId {
    let mut s = raw_id.trim().to_string();
    for _ in 0..2 {
        match urlencoding::decode(&s) {
            Ok(decoded) if decoded != s => s = decoded.into_owned(),
            _ => break,
        }
    }

    let lower = s.to_lowercase();
    let (catalog, rest) = if let Some(rest) = lower.strip_prefix("tmdb:") {
        (Catalog::Tmdb, rest.to_string())
    } else if let Some(rest) = lower.strip_prefix("tvdb:") {
        (Catalog::Tvdb, rest.to_string())
    } else {
        (Catalog::Imdb, s.clone())
    };

    let mut parts = rest.split(':');
    let base = parts.next().unwrap_or_default().to_string();
    let season = parts.next().and_then(|p| p.parse::<u32>().ok());
    let episode = parts.next().and_then(|p| p.parse::<u32>().ok());

    MediaId {
        catalog,
        base,
        season,
        episode,
    }
}

/// Synthesize a search title from a video filename.
///
/// Strips the extension, turns separators into spaces, and cuts the name at
/// the first release-noise token (year, resolution, source, codec).
pub fn title_from_filename(filename: &str) -> Option<String> {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    let stem = match base.rsplit_once('.') {
        Some((stem, ext)) if ext.len() <= 4 && !stem.is_empty() => stem,
        _ => base,
    };

    let spaced = stem.replace(['.', '_'], " ");
    let cut = match RELEASE_NOISE_RE.find(&spaced) {
        Some(m) => &spaced[..m.start()],
        None => spaced.as_str(),
    };
    let cleaned = cut
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == '-' || c == '(' || c == '[' || c.is_whitespace())
        .to_string();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Lower-cased alphanumeric token string used for fuzzy containment checks.
fn normalize_fragment(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|tok| !tok.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the canonical `SearchQuery` for a lookup.
///
/// Title resolution order: authoritative hint title, then filename
/// heuristics. Year resolution order: hint year, then a 4-digit year found
/// in the filename or the derived title. With no usable title the lookup is
/// unresolvable.
pub fn normalize(
    kind: MediaKind,
    raw_id: &str,
    hints: &QueryHints,
) -> Result<SearchQuery, NormalizeError> {
    let id = parse_media_id(raw_id);

    let title = match &hints.title {
        Some(t) if !t.trim().is_empty() => t.trim().to_string(),
        _ => {
            let fallback = hints.filename.as_deref().and_then(title_from_filename);
            match fallback {
                Some(t) => {
                    warn!(raw_id = raw_id, title = %t, "falling back to filename-derived title");
                    t
                }
                None => {
                    debug!(raw_id = raw_id, "no usable title for query");
                    return Err(NormalizeError::Unresolvable);
                }
            }
        }
    };

    // Multi-language titles like "Heat / Жега" search badly; keep the first.
    let title = match title.split_once(" / ") {
        Some((first, _)) => first.trim().to_string(),
        None => title,
    };

    let year = hints
        .year
        .or_else(|| hints.filename.as_deref().and_then(extract_year))
        .or_else(|| extract_year(&title).filter(|_| hints.title.is_none()));

    let kind = match kind {
        MediaKind::Movie if id.season.is_some() && id.episode.is_some() => MediaKind::Series,
        other => other,
    };

    let catalog_id = if id.base.is_empty() {
        None
    } else {
        Some(match id.catalog {
            Catalog::Imdb => id.base.clone(),
            Catalog::Tmdb => format!("tmdb:{}", id.base),
            Catalog::Tvdb => format!("tvdb:{}", id.base),
        })
    };

    Ok(SearchQuery {
        kind,
        fragment: normalize_fragment(&title),
        title,
        year,
        season: id.season,
        episode: id.episode,
        catalog_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_movie_id() {
        let id = parse_media_id("tt0369179");
        assert_eq!(id.catalog, Catalog::Imdb);
        assert_eq!(id.base, "tt0369179");
        assert_eq!(id.season, None);
        assert_eq!(id.episode, None);
    }

    #[test]
    fn test_parse_series_id() {
        let id = parse_media_id("tt0369179:1:2");
        assert_eq!(id.base, "tt0369179");
        assert_eq!(id.season, Some(1));
        assert_eq!(id.episode, Some(2));
    }

    #[test]
    fn test_parse_encoded_once() {
        let id = parse_media_id("tt0369179%3A1%3A2");
        assert_eq!(id.base, "tt0369179");
        assert_eq!(id.season, Some(1));
    }

    #[test]
    fn test_parse_encoded_twice() {
        let id = parse_media_id("tt0369179%253A1%253A2");
        assert_eq!(id.base, "tt0369179");
        assert_eq!(id.episode, Some(2));
    }

    #[test]
    fn test_parse_tmdb_prefix() {
        let id = parse_media_id("tmdb:550");
        assert_eq!(id.catalog, Catalog::Tmdb);
        assert_eq!(id.base, "550");
    }

    #[test]
    fn test_parse_tvdb_with_episode() {
        let id = parse_media_id("tvdb:81189:2:5");
        assert_eq!(id.catalog, Catalog::Tvdb);
        assert_eq!(id.base, "81189");
        assert_eq!(id.season, Some(2));
        assert_eq!(id.episode, Some(5));
    }

    #[test]
    fn test_extract_year() {
        assert_eq!(extract_year("Heat 1995 remaster"), Some(1995));
        assert_eq!(extract_year("no year here"), None);
        assert_eq!(extract_year("year 2155 is too late"), None);
    }

    #[test]
    fn test_title_from_filename_strips_release_noise() {
        let title = title_from_filename("Heat.1995.1080p.BluRay.x264-GRP.mkv");
        assert_eq!(title.as_deref(), Some("Heat"));
    }

    #[test]
    fn test_title_from_filename_plain() {
        let title = title_from_filename("Some Movie.mkv");
        assert_eq!(title.as_deref(), Some("Some Movie"));
    }

    #[test]
    fn test_title_from_filename_with_path() {
        let title = title_from_filename("/media/films/The.Thing.1982.720p.mkv");
        assert_eq!(title.as_deref(), Some("The Thing"));
    }

    #[test]
    fn test_title_from_filename_empty() {
        assert_eq!(title_from_filename("1080p.x264.mkv"), None);
    }

    #[test]
    fn test_normalize_with_authoritative_hints() {
        let hints = QueryHints {
            title: Some("Tenet".to_string()),
            year: Some(2020),
            filename: None,
        };
        let query = normalize(MediaKind::Movie, "tt6723592", &hints).unwrap();
        assert_eq!(query.title, "Tenet");
        assert_eq!(query.year, Some(2020));
        assert_eq!(query.fragment, "tenet");
        assert_eq!(query.canonical_text(), "Tenet");
        assert_eq!(query.catalog_id.as_deref(), Some("tt6723592"));
    }

    #[test]
    fn test_normalize_series_canonical_text() {
        let hints = QueryHints {
            title: Some("The Office".to_string()),
            ..Default::default()
        };
        let query = normalize(MediaKind::Series, "tt0386676:3:7", &hints).unwrap();
        assert_eq!(query.season, Some(3));
        assert_eq!(query.episode, Some(7));
        assert_eq!(query.canonical_text(), "The Office 03x07");
    }

    #[test]
    fn test_normalize_filename_fallback() {
        let hints = QueryHints {
            filename: Some("Heat.1995.1080p.BluRay.x264-GRP.mkv".to_string()),
            ..Default::default()
        };
        let query = normalize(MediaKind::Movie, "tt0113277", &hints).unwrap();
        assert_eq!(query.title, "Heat");
        assert_eq!(query.year, Some(1995));
    }

    #[test]
    fn test_normalize_strips_alternate_title() {
        let hints = QueryHints {
            title: Some("Heat / Жега".to_string()),
            ..Default::default()
        };
        let query = normalize(MediaKind::Movie, "tt0113277", &hints).unwrap();
        assert_eq!(query.title, "Heat");
    }

    #[test]
    fn test_normalize_unresolvable() {
        let err = normalize(MediaKind::Movie, "tt0000000", &QueryHints::default()).unwrap_err();
        assert_eq!(err, NormalizeError::Unresolvable);
    }

    #[test]
    fn test_normalize_promotes_kind_for_episode_ids() {
        let hints = QueryHints {
            title: Some("The Office".to_string()),
            ..Default::default()
        };
        let query = normalize(MediaKind::Movie, "tt0386676:3:7", &hints).unwrap();
        assert_eq!(query.kind, MediaKind::Series);
    }
}
