// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! The parameter tree: named containers holding child containers and
//! child parameters, looked up by path.

use super::param::Parameter;
use super::path::{glob_match, segments};
use std::sync::Arc;

enum Child {
    Container(Container),
    Parameter(Arc<Parameter>),
}

/// A named inner tree node. The root container's name is the empty
/// string. Sibling names (across both child containers and child
/// parameters) must be distinct.
pub struct Container {
    name: String,
    children: Vec<Child>,
}

/// What a path resolved to.
pub enum Lookup<'a> {
    Container(&'a Container),
    Parameter(&'a Arc<Parameter>),
}

impl Container {
    pub fn new(name: impl Into<String>) -> Container {
        Container {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn root() -> Container {
        Container::new("")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a child container. Panics on a duplicate sibling name: this
    /// is a construction-time programming error, not a runtime
    /// condition a caller recovers from.
    pub fn add_container(&mut self, child: Container) -> &mut Container {
        assert!(
            self.child_names().all(|n| n != child.name),
            "duplicate sibling name {:?} under {:?}",
            child.name,
            self.name
        );
        self.children.push(Child::Container(child));
        match self.children.last_mut().unwrap() {
            Child::Container(c) => c,
            Child::Parameter(_) => unreachable!(),
        }
    }

    pub fn add_parameter(&mut self, param: Arc<Parameter>) {
        assert!(
            self.child_names().all(|n| n != param.name()),
            "duplicate sibling name {:?} under {:?}",
            param.name(),
            self.name
        );
        self.children.push(Child::Parameter(param));
    }

    fn child_names(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|c| match c {
            Child::Container(c) => c.name.as_str(),
            Child::Parameter(p) => p.name(),
        })
    }

    pub fn containers(&self) -> impl Iterator<Item = &Container> {
        self.children.iter().filter_map(|c| match c {
            Child::Container(c) => Some(c),
            Child::Parameter(_) => None,
        })
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Arc<Parameter>> {
        self.children.iter().filter_map(|c| match c {
            Child::Parameter(p) => Some(p),
            Child::Container(_) => None,
        })
    }

    fn child_container(&self, name: &str) -> Option<&Container> {
        self.containers().find(|c| c.name == name)
    }

    fn child_parameter(&self, name: &str) -> Option<&Arc<Parameter>> {
        self.parameters().find(|p| p.name() == name)
    }

    /// Resolve a path relative to `self`. `.` stays put, `..` moves to
    /// the parent (or stays at root if already there), an empty segment
    /// is skipped, anything else names a child.
    pub fn resolve(&self, path: &str) -> Option<Lookup<'_>> {
        let mut stack: Vec<&Container> = vec![self];
        let segs = segments(path);
        let mut iter = segs.iter().peekable();
        while let Some(&seg) = iter.next() {
            if seg == "." {
                continue;
            }
            if seg == ".." {
                if stack.len() > 1 {
                    stack.pop();
                }
                continue;
            }
            let cur = *stack.last().unwrap();
            if let Some(child) = cur.child_container(seg) {
                stack.push(child);
            } else if let Some(param) = cur.child_parameter(seg) {
                return if iter.peek().is_some() {
                    None
                } else {
                    Some(Lookup::Parameter(param))
                };
            } else {
                return None;
            }
        }
        Some(Lookup::Container(stack.pop().unwrap()))
    }

    pub fn resolve_parameter(&self, path: &str) -> Option<&Arc<Parameter>> {
        match self.resolve(path)? {
            Lookup::Parameter(p) => Some(p),
            Lookup::Container(_) => None,
        }
    }

    /// All parameters under `self`, with their paths relative to it,
    /// matching a glob pattern applied segment-by-segment.
    pub fn find(&self, pattern: &str) -> Vec<(String, Arc<Parameter>)> {
        let pat_segs = segments(pattern);
        let mut out = Vec::new();
        self.find_rec(&pat_segs, String::new(), &mut out);
        out
    }

    fn find_rec(&self, pat: &[&str], prefix: String, out: &mut Vec<(String, Arc<Parameter>)>) {
        let Some((head, rest)) = pat.split_first() else {
            return;
        };
        for p in self.parameters() {
            if rest.is_empty() && glob_match(head, p.name()) {
                out.push((format!("{}/{}", prefix, p.name()), p.clone()));
            }
        }
        for c in self.containers() {
            if glob_match(head, &c.name) {
                c.find_rec(rest, format!("{}/{}", prefix, c.name), out);
            }
        }
    }

    /// Walk every parameter in the subtree rooted at `self`, depth
    /// first, calling `f` with its path relative to `self`.
    pub fn walk(&self, mut f: impl FnMut(&str, &Arc<Parameter>)) {
        self.walk_rec(String::new(), &mut f);
    }

    fn walk_rec(&self, prefix: String, f: &mut impl FnMut(&str, &Arc<Parameter>)) {
        for p in self.parameters() {
            f(&format!("{}/{}", prefix, p.name()), p);
        }
        for c in self.containers() {
            c.walk_rec(format!("{}/{}", prefix, c.name), f);
        }
    }

    /// Sibling names visible at this container, used by tab completion.
    pub fn child_name_list(&self) -> Vec<String> {
        self.child_names().map(|s| s.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::param::{Access, ScalarParam};

    fn sample_tree() -> Container {
        let mut root = Container::root();
        let mut motor = Container::new("motor");
        motor.add_parameter(Arc::new(Parameter::new(
            "velocity",
            Access::scalar_rw(),
            Box::new(ScalarParam::read_only(|| 1.0f32)),
        )));
        root.add_container(motor);
        root.add_parameter(Arc::new(Parameter::new(
            "mode",
            Access::scalar_rw(),
            Box::new(ScalarParam::read_only(|| 0i32)),
        )));
        root
    }

    #[test]
    fn resolves_absolute_path_to_parameter() {
        let root = sample_tree();
        let p = root.resolve_parameter("/motor/velocity").unwrap();
        assert_eq!(p.name(), "velocity");
    }

    #[test]
    fn dot_and_dotdot_are_handled() {
        let root = sample_tree();
        match root.resolve("motor/.././mode") {
            Some(Lookup::Parameter(p)) => assert_eq!(p.name(), "mode"),
            _ => panic!("expected parameter"),
        }
    }

    #[test]
    fn dotdot_at_root_stays_at_root() {
        let root = sample_tree();
        match root.resolve("../mode") {
            Some(Lookup::Parameter(p)) => assert_eq!(p.name(), "mode"),
            _ => panic!("expected parameter"),
        }
    }

    #[test]
    fn unknown_segment_is_none() {
        let root = sample_tree();
        assert!(root.resolve("/nope").is_none());
    }

    #[test]
    fn path_through_a_parameter_is_none() {
        let root = sample_tree();
        assert!(root.resolve("/mode/velocity").is_none());
    }

    #[test]
    fn find_matches_glob_across_segments() {
        let root = sample_tree();
        let found = root.find("motor/*");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "/motor/velocity");
    }

    #[test]
    #[should_panic(expected = "duplicate sibling name")]
    fn duplicate_sibling_names_panic() {
        let mut root = Container::root();
        root.add_parameter(Arc::new(Parameter::new(
            "x",
            Access::scalar_ro(),
            Box::new(ScalarParam::read_only(|| 1i32)),
        )));
        root.add_parameter(Arc::new(Parameter::new(
            "x",
            Access::scalar_ro(),
            Box::new(ScalarParam::read_only(|| 2i32)),
        )));
    }
}
