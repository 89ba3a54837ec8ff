#[cfg(test)]
pub mod test {
    use crate::node::ConfigNode;

    /// Three levels deep, one leaf: `a.b.name = "v"`.
    pub const NESTED: &str = r#"{"a": {"b": {"name": "v"}}}"#;

    /// A service config with scalars, a list, macro-bearing strings, and two sections.
    pub const SERVER: &str = r#"{
        "host": "localhost",
        "port": 8080,
        "debug": false,
        "ratio": 0.75,
        "tags": ["web", "api"],
        "greeting": "Listening on [host]:[port]",
        "database": {
            "url": "postgres://localhost/app",
            "pool_size": 5,
            "label": "[../host] pool of [pool_size]"
        },
        "logging": {
            "level": "info",
            "file": {"path": "/var/log/app.log", "rotate": true}
        },
        "optional": null
    }"#;

    pub fn nested_tree() -> ConfigNode {
        ConfigNode::parse(NESTED).unwrap()
    }

    pub fn server_tree() -> ConfigNode {
        ConfigNode::parse(SERVER).unwrap()
    }

    #[test]
    fn fixtures_parse() {
        assert_eq!(nested_tree().len(), 1);
        assert_eq!(server_tree().len(), 9);
    }
}
