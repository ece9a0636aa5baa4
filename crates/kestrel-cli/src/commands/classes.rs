//! `kestrel-check classes`: print the registered class hierarchy.

use std::fmt::Write as _;
use std::path::Path;

use kestrel_core::{Class, Runtime};
use serde::Serialize;

/// One class in the printed hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassNode {
    /// Class name
    pub name: String,
    /// Properties registered on this class, sorted
    pub properties: Vec<String>,
    /// Methods registered on this class, sorted
    pub methods: Vec<String>,
    /// Direct subclasses, in registration order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ClassNode>,
}

impl ClassNode {
    fn build(class: &Class, all: &[Class]) -> Self {
        let children = all
            .iter()
            .filter(|c| c.parent().map_or(false, |p| p.ptr_eq(class)))
            .map(|c| ClassNode::build(c, all))
            .collect();
        Self {
            name: class.name().to_string(),
            properties: class.own_property_names(),
            methods: class.own_method_names(),
            children,
        }
    }

    fn render(&self, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        let _ = writeln!(out, "{}{}", indent, self.name);
        if !self.properties.is_empty() {
            let _ = writeln!(out, "{}  properties: {}", indent, self.properties.join(", "));
        }
        if !self.methods.is_empty() {
            let _ = writeln!(out, "{}  methods: {}", indent, self.methods.join(", "));
        }
        for child in &self.children {
            child.render(depth + 1, out);
        }
    }
}

/// Hierarchy rooted at the runtime's root class, in registration order
pub fn hierarchy(rt: &Runtime) -> ClassNode {
    let all = rt.classes();
    ClassNode::build(rt.root_class(), &all)
}

/// Indented text rendering of `root`
pub fn render(root: &ClassNode) -> String {
    let mut out = String::new();
    root.render(0, &mut out);
    out
}

/// Print the class tree as text, or as JSON with `json`
pub fn execute(config: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let options = super::load_options(config)?;
    let rt = super::build_runtime(options)?;
    let root = hierarchy(&rt);

    if json {
        println!("{}", serde_json::to_string_pretty(&root)?);
    } else {
        print!("{}", render(&root));
    }
    Ok(())
}
