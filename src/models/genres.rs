/// Fixed TMDB genre name → id lookup table
///
/// Bundled rather than fetched: the TMDB genre list is stable and the mapper
/// must not spend a request on it. Lookup is case-insensitive and tolerant of
/// the aliases the model tends to produce for science fiction.
pub fn genre_id(name: &str) -> Option<u32> {
    let id = match name.trim().to_lowercase().as_str() {
        "action" => 28,
        "adventure" => 12,
        "animation" => 16,
        "comedy" => 35,
        "crime" => 80,
        "documentary" => 99,
        "drama" => 18,
        "family" => 10751,
        "fantasy" => 14,
        "history" => 36,
        "horror" => 27,
        "music" => 10402,
        "mystery" => 9648,
        "romance" => 10749,
        "science" | "sci-fi" | "science fiction" => 878,
        "thriller" => 53,
        "war" => 10752,
        "western" => 37,
        _ => return None,
    };
    Some(id)
}

/// Maps genre names to a comma-separated id list, dropping unknown names.
/// Returns an empty string when nothing resolves; callers must omit the
/// query parameter in that case rather than send an empty constraint.
pub fn map_genres(genres: &[String]) -> String {
    genres
        .iter()
        .filter_map(|g| genre_id(g))
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genre_id_case_insensitive() {
        assert_eq!(genre_id("Action"), Some(28));
        assert_eq!(genre_id("HORROR"), Some(27));
    }

    #[test]
    fn test_genre_id_science_fiction_aliases() {
        assert_eq!(genre_id("Science Fiction"), Some(878));
        assert_eq!(genre_id("sci-fi"), Some(878));
        assert_eq!(genre_id("science"), Some(878));
    }

    #[test]
    fn test_genre_id_unknown() {
        assert_eq!(genre_id("telenovela"), None);
    }

    #[test]
    fn test_map_genres_joins_with_commas() {
        let genres = vec!["Action".to_string(), "Thriller".to_string()];
        assert_eq!(map_genres(&genres), "28,53");
    }

    #[test]
    fn test_map_genres_drops_unknowns() {
        let genres = vec![
            "Science Fiction".to_string(),
            "telenovela".to_string(),
            "Drama".to_string(),
        ];
        assert_eq!(map_genres(&genres), "878,18");
    }

    #[test]
    fn test_map_genres_all_unknown_is_empty() {
        let genres = vec!["telenovela".to_string()];
        assert_eq!(map_genres(&genres), "");
    }
}
