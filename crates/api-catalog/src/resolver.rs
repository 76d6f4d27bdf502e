//! `$ref` dereferencing for API documents

use serde_json::Value;
use tracing::{debug, warn};

/// Replaces local `$ref` references with copies of their targets.
///
/// A reference already being expanded higher up the same branch is left
/// literal, so recursive schemas stay finite.
pub struct Dereferencer<'a> {
    /// The whole document; refs are JSON pointers into it
    document: &'a Value,
    /// Maximum number of nested references followed on one branch
    max_depth: usize,
}

impl<'a> Dereferencer<'a> {
    pub fn new(document: &'a Value) -> Self {
        Self {
            document,
            max_depth: 10,
        }
    }

    /// Produce a copy of the document with every resolvable `$ref` inlined
    pub fn dereference(document: &Value) -> Value {
        Dereferencer::new(document).resolve(document)
    }

    /// Resolve a value, following `$ref` references
    pub fn resolve(&self, value: &Value) -> Value {
        self.resolve_in_chain(value, &mut Vec::new())
    }

    /// `chain` holds the refs being expanded above `value`
    fn resolve_in_chain(&self, value: &Value, chain: &mut Vec<String>) -> Value {
        match value {
            Value::Object(obj) => {
                if let Some(ref_str) = obj.get("$ref").and_then(Value::as_str) {
                    if chain.iter().any(|seen| seen == ref_str) {
                        debug!("Leaving recursive reference {} unexpanded", ref_str);
                        return value.clone();
                    }
                    if chain.len() >= self.max_depth {
                        warn!("Reference chain too deep at {}", ref_str);
                        return value.clone();
                    }
                    if let Some(target) = self.lookup(ref_str) {
                        chain.push(ref_str.to_string());
                        let resolved = self.resolve_in_chain(target, chain);
                        chain.pop();
                        return resolved;
                    }
                }

                let mut result = serde_json::Map::new();
                for (key, child) in obj {
                    result.insert(key.clone(), self.resolve_in_chain(child, chain));
                }
                Value::Object(result)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.resolve_in_chain(item, chain))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }

    fn lookup(&self, ref_str: &str) -> Option<&'a Value> {
        // Parse refs like "#/components/schemas/Pet"
        let Some(pointer) = ref_str.strip_prefix('#') else {
            warn!("Skipping non-local reference: {}", ref_str);
            return None;
        };

        let found = self.document.pointer(pointer);
        if found.is_none() {
            warn!("Unresolvable reference: {}", ref_str);
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_simple_ref() {
        let doc = json!({
            "components": {"schemas": {"User": {
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"]
            }}},
            "paths": {"/users": {"post": {"requestBody": {"content": {
                "application/json": {"schema": {"$ref": "#/components/schemas/User"}}
            }}}}}
        });

        let resolved = Dereferencer::dereference(&doc);
        let schema = &resolved["paths"]["/users"]["post"]["requestBody"]["content"]["application/json"]["schema"];

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["name"]));
    }

    #[test]
    fn test_resolve_nested_ref_and_arrays() {
        let doc = json!({
            "components": {
                "schemas": {
                    "Address": {"type": "object", "properties": {"street": {"type": "string"}}},
                    "User": {"type": "object", "properties": {
                        "address": {"$ref": "#/components/schemas/Address"}
                    }}
                },
                "parameters": {
                    "PetId": {"name": "petId", "in": "path", "required": true}
                }
            },
            "paths": {"/pets/{petId}": {"get": {
                "parameters": [{"$ref": "#/components/parameters/PetId"}],
                "responses": {"200": {"content": {"application/json": {
                    "schema": {"allOf": [{"$ref": "#/components/schemas/User"}]}
                }}}}
            }}}
        });

        let resolved = Dereferencer::dereference(&doc);
        let op = &resolved["paths"]["/pets/{petId}"]["get"];

        assert_eq!(op["parameters"][0]["name"], "petId");
        let user = &op["responses"]["200"]["content"]["application/json"]["schema"]["allOf"][0];
        assert_eq!(user["properties"]["address"]["properties"]["street"]["type"], "string");
    }

    #[test]
    fn test_escaped_pointer_segments() {
        let doc = json!({
            "paths": {"/a/b": {"get": {"summary": "x"}}},
            "alias": {"$ref": "#/paths/~1a~1b/get"}
        });

        let resolved = Dereferencer::dereference(&doc);
        assert_eq!(resolved["alias"]["summary"], "x");
    }

    #[test]
    fn test_cycles_stay_literal() {
        let doc = json!({
            "components": {"schemas": {"Node": {
                "type": "object",
                "properties": {"next": {"$ref": "#/components/schemas/Node"}}
            }}},
            "root": {"$ref": "#/components/schemas/Node"}
        });

        let resolved = Dereferencer::dereference(&doc);
        assert_eq!(resolved["root"]["type"], "object");
        assert_eq!(
            resolved["root"]["properties"]["next"],
            json!({"$ref": "#/components/schemas/Node"})
        );
    }

    fn count_nodes(value: &Value) -> usize {
        1 + match value {
            Value::Object(obj) => obj.values().map(count_nodes).sum(),
            Value::Array(items) => items.iter().map(count_nodes).sum(),
            _ => 0,
        }
    }

    #[test]
    fn test_many_self_references_stay_linear() {
        let properties: serde_json::Map<String, Value> = (0..6)
            .map(|i| (format!("c{}", i), json!({"$ref": "#/components/schemas/Node"})))
            .collect();
        let doc = json!({
            "components": {"schemas": {"Node": {"type": "object", "properties": properties}}},
            "root": {"$ref": "#/components/schemas/Node"},
            "list": {"type": "array", "items": {"$ref": "#/components/schemas/Node"}}
        });

        let resolved = Dereferencer::dereference(&doc);

        assert!(count_nodes(&resolved) <= 3 * count_nodes(&doc));
        assert_eq!(resolved["root"]["properties"]["c5"]["$ref"], "#/components/schemas/Node");
        assert_eq!(resolved["list"]["items"]["type"], "object");
    }

    #[test]
    fn test_shared_refs_expand_on_every_branch() {
        let doc = json!({
            "components": {"schemas": {
                "Tag": {"type": "string"},
                "Pet": {"type": "object", "properties": {
                    "tag": {"$ref": "#/components/schemas/Tag"},
                    "alias": {"$ref": "#/components/schemas/Tag"}
                }}
            }},
            "root": {"$ref": "#/components/schemas/Pet"}
        });

        let resolved = Dereferencer::dereference(&doc);
        assert_eq!(resolved["root"]["properties"]["tag"]["type"], "string");
        assert_eq!(resolved["root"]["properties"]["alias"]["type"], "string");
    }

    #[test]
    fn test_unresolvable_refs_stay_literal() {
        let doc = json!({
            "a": {"$ref": "#/missing"},
            "b": {"$ref": "other.yaml#/Pet"}
        });

        let resolved = Dereferencer::dereference(&doc);
        assert_eq!(resolved["a"]["$ref"], "#/missing");
        assert_eq!(resolved["b"]["$ref"], "other.yaml#/Pet");
    }
}
