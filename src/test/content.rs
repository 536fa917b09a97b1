#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::models::EntryContent;

    #[test]
    fn test_canonical_shape_round_trips() {
        let content = crate::test::utils::test_db::content_with(2, 1, 3);

        let encoded = serde_json::to_string(&content).unwrap();
        let decoded = EntryContent::from_json_str(&encoded);

        assert_eq!(content, decoded);
    }

    #[test]
    fn test_legacy_flat_shape_is_migrated() {
        let legacy = json!({
            "article": {
                "title": "Understanding ownership",
                "url": "https://example.com/ownership",
                "notes": "Re-read the borrow section"
            },
            "python_code": "def fib(n): ...",
            "sql_code": "SELECT 1;",
            "wisdom": { "text": "Make it work first", "source": "somewhere" },
            "english_words": [
                { "word": "tenet", "meaning": "principle" },
                { "word": "parse", "meaning": "analyze" }
            ],
            "mini_project": { "name": "tracker", "progress": "half done", "status": "active" }
        })
        .to_string();

        let content = EntryContent::from_json_str(&legacy);

        let reading = content.categories.get("reading").expect("reading bucket");
        assert_eq!(reading.articles.len(), 1);
        assert_eq!(reading.articles[0].title, "Understanding ownership");

        let coding = content.categories.get("coding").expect("coding bucket");
        assert_eq!(coding.questions.len(), 2);
        assert_eq!(coding.questions[0].language, "python");
        assert_eq!(coding.questions[1].language, "sql");

        let projects = content.categories.get("projects").expect("projects bucket");
        assert_eq!(projects.items.len(), 1);
        assert_eq!(projects.items[0].name, "tracker");
        assert_eq!(projects.items[0].notes, "half done");

        assert_eq!(content.vocabulary.len(), 2);
        assert_eq!(content.vocabulary[0].word, "tenet");

        assert_eq!(content.reflection, "Make it work first (somewhere)");
    }

    #[test]
    fn test_legacy_empty_fields_are_skipped() {
        let legacy = json!({
            "article": { "title": "", "url": "", "notes": "" },
            "python_code": "",
            "sql_code": "",
            "wisdom": { "text": "", "source": "" },
            "english_words": [],
            "mini_project": { "name": "", "progress": "", "status": "" }
        })
        .to_string();

        let content = EntryContent::from_json_str(&legacy);

        assert!(content.categories.is_empty());
        assert!(content.vocabulary.is_empty());
        assert!(content.reflection.is_empty());
    }

    #[test]
    fn test_garbage_decodes_to_empty() {
        for raw in ["", "not json", "[1, 2, 3]", "{\"categories\": 7}"] {
            let content = EntryContent::from_json_str(raw);
            assert_eq!(content, EntryContent::default(), "input: {:?}", raw);
        }
    }

    #[test]
    fn test_partial_canonical_content_defaults() {
        let content = EntryContent::from_json_str(r#"{"categories": {"coding": {}}}"#);

        let coding = content.categories.get("coding").expect("coding bucket");
        assert!(coding.is_empty());
        assert!(content.vocabulary.is_empty());
    }
}
