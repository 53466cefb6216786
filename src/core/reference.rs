use url::Url;

const PLATFORM_HOSTS: &[&str] = &["youtube.com", "youtu.be"];

/// Pulls the playlist id out of a `list=` query parameter.
///
/// Anything that is not a parseable URL on a known platform host yields
/// `None`; callers report that as bad input.
pub fn extract_collection_id(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    if !PLATFORM_HOSTS.iter().any(|h| host.contains(h)) {
        return None;
    }

    url.query_pairs()
        .find(|(k, _)| k == "list")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Canonical watch URL for a single item id.
pub fn item_url(video_id: &str) -> String {
    Url::parse_with_params("https://www.youtube.com/watch", [("v", video_id)])
        .map(String::from)
        .unwrap_or_else(|_| format!("https://www.youtube.com/watch?v={}", video_id))
}

/// Canonical listing URL for a playlist id.
pub fn collection_url(list_id: &str) -> String {
    Url::parse_with_params("https://www.youtube.com/playlist", [("list", list_id)])
        .map(String::from)
        .unwrap_or_else(|_| format!("https://www.youtube.com/playlist?list={}", list_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_list_from_watch_url() {
        assert_eq!(
            extract_collection_id("https://www.youtube.com/watch?v=X&list=PL123"),
            Some("PL123".to_string())
        );
    }

    #[test]
    fn accepts_playlist_page_and_short_host() {
        assert_eq!(
            extract_collection_id("https://youtube.com/playlist?list=PLabc"),
            Some("PLabc".to_string())
        );
        assert_eq!(
            extract_collection_id("https://youtu.be/X?list=PLxyz"),
            Some("PLxyz".to_string())
        );
    }

    #[test]
    fn rejects_foreign_hosts_and_missing_list() {
        assert_eq!(extract_collection_id("https://vimeo.com/watch?list=PL1"), None);
        assert_eq!(extract_collection_id("https://www.youtube.com/watch?v=X"), None);
        assert_eq!(extract_collection_id("https://www.youtube.com/watch?list="), None);
        assert_eq!(extract_collection_id("not a url"), None);
        assert_eq!(extract_collection_id(""), None);
    }

    #[test]
    fn item_ids_cannot_inject_query_parameters() {
        assert_eq!(item_url("abc123"), "https://www.youtube.com/watch?v=abc123");
        assert_eq!(
            item_url("x&list=PL9"),
            "https://www.youtube.com/watch?v=x%26list%3DPL9"
        );
        assert_eq!(collection_url("PL123"), "https://www.youtube.com/playlist?list=PL123");
    }
}
