//! Test support: a miniature class registry over an arena of graph nodes.
//!
//! Two classes, `GraphNode` and its subclass `TaggedNode`, share one node
//! layout whose streamer exercises the full surface: packed version frames,
//! scalars, wide integers, strings and nested object references.

mod properties;

use std::any::TypeId;

use crate::decoding::{DecodeError, ReadBuffer};
use crate::encoding::{EncodeError, WriteBuffer};
use crate::registry::{ClassId, ClassRegistry, ObjectId, StreamParent};

pub(crate) const GRAPH_NODE: ClassId = ClassId(0);
pub(crate) const TAGGED_NODE: ClassId = ClassId(1);

struct TestClass {
    name: &'static str,
    version: u16,
    parent: Option<ClassId>,
}

#[derive(Clone, Default)]
pub(crate) struct TestNode {
    pub(crate) class: u32,
    pub(crate) value: i32,
    pub(crate) weight: i64,
    pub(crate) label: String,
    pub(crate) next: Option<ObjectId>,
    pub(crate) other: Option<ObjectId>,
}

pub(crate) struct TestRegistry {
    classes: Vec<TestClass>,
    pub(crate) nodes: Vec<TestNode>,
    hidden: Option<&'static str>,
    pub(crate) fail_construct: bool,
    /// When set, the read streamer forgets to read the trailing reference,
    /// simulating a streamer that fell out of sync with the wire.
    pub(crate) skip_tail_on_read: bool,
}

impl TestRegistry {
    pub(crate) fn new() -> Self {
        TestRegistry {
            classes: vec![
                TestClass {
                    name: "GraphNode",
                    version: 7,
                    parent: None,
                },
                TestClass {
                    name: "TaggedNode",
                    version: 3,
                    parent: Some(GRAPH_NODE),
                },
            ],
            nodes: Vec::new(),
            hidden: None,
            fail_construct: false,
            skip_tail_on_read: false,
        }
    }

    /// Pretends the dictionary has no entry for `name`.
    pub(crate) fn hide(&mut self, name: &'static str) {
        self.hidden = Some(name);
    }

    pub(crate) fn add_node(&mut self, class: ClassId, value: i32) -> ObjectId {
        let id = ObjectId(self.nodes.len() as u64);
        self.nodes.push(TestNode {
            class: class.0,
            value,
            ..TestNode::default()
        });
        id
    }

    pub(crate) fn node(&self, id: ObjectId) -> &TestNode {
        &self.nodes[id.0 as usize]
    }

    pub(crate) fn node_mut(&mut self, id: ObjectId) -> &mut TestNode {
        &mut self.nodes[id.0 as usize]
    }
}

impl ClassRegistry for TestRegistry {
    fn class_by_name(&self, name: &str) -> Option<ClassId> {
        if self.hidden.is_some_and(|h| h == name) {
            return None;
        }
        self.classes
            .iter()
            .position(|c| c.name == name)
            .map(|i| ClassId(i as u32))
    }

    fn class_by_type_id(&self, type_id: TypeId) -> Option<ClassId> {
        (type_id == TypeId::of::<TestNode>()).then_some(GRAPH_NODE)
    }

    fn class_name(&self, class: ClassId) -> &str {
        self.classes[class.0 as usize].name
    }

    fn class_version(&self, class: ClassId) -> u16 {
        self.classes[class.0 as usize].version
    }

    fn inherits_from(&self, class: ClassId, base: ClassId) -> bool {
        let mut current = Some(class);
        while let Some(c) = current {
            if c == base {
                return true;
            }
            current = self.classes[c.0 as usize].parent;
        }
        false
    }

    fn base_class_offset(&self, class: ClassId, base: ClassId) -> Option<isize> {
        self.inherits_from(class, base).then_some(0)
    }

    fn actual_class(&self, _declared: ClassId, obj: ObjectId) -> Option<ClassId> {
        let class = ClassId(self.nodes[obj.0 as usize].class);
        if self.hidden.is_some_and(|h| h == self.class_name(class)) {
            None
        } else {
            Some(class)
        }
    }

    fn construct(&mut self, class: ClassId) -> Option<ObjectId> {
        if self.fail_construct {
            return None;
        }
        Some(self.add_node(class, 0))
    }

    fn store_class(&self, class: ClassId, buf: &mut WriteBuffer) -> Result<(), EncodeError> {
        buf.write_string(self.class_name(class))
    }

    fn load_class(&mut self, buf: &mut ReadBuffer) -> Result<Option<ClassId>, DecodeError> {
        let name = buf.read_string(None)?;
        let class = self.class_by_name(&name);
        if class.is_none() {
            warn!(message = "class dictionary missing", class = name.as_str());
        }
        Ok(class)
    }

    fn stream_write(
        &self,
        class: ClassId,
        obj: ObjectId,
        buf: &mut WriteBuffer,
    ) -> Result<(), EncodeError> {
        let node = self.node(obj).clone();
        let cntpos = buf.write_version(self, class, true)?;
        buf.write(node.value)?;
        buf.write_wide(node.weight)?;
        buf.write_string(&node.label)?;
        buf.write_object_any(self, node.next, GRAPH_NODE)?;
        buf.write_object_any(self, node.other, GRAPH_NODE)?;
        buf.set_byte_count(cntpos, true)
    }

    fn stream_read(
        &mut self,
        class: ClassId,
        obj: ObjectId,
        buf: &mut ReadBuffer,
    ) -> Result<(), DecodeError> {
        let (version, startpos, bcnt) = buf.read_version_with_count()?;
        debug_assert_eq!(version, self.class_version(class));
        let value = buf.read::<i32>()?;
        let weight = buf.read_wide()?;
        let label = buf.read_string(None)?;
        let next = buf.read_object_any(self, Some(GRAPH_NODE))?;
        let other = if self.skip_tail_on_read {
            None
        } else {
            buf.read_object_any(self, Some(GRAPH_NODE))?
        };

        let node = self.node_mut(obj);
        node.value = value;
        node.weight = weight;
        node.label = label;
        node.next = next;
        node.other = other;

        let name: &'static str = self.classes[class.0 as usize].name;
        buf.check_byte_count(startpos, bcnt, Some(name));
        Ok(())
    }
}

/// A parent container reporting a fixed format version.
pub(crate) struct VersionParent(pub(crate) i32);

impl StreamParent for VersionParent {
    fn format_version(&self) -> i32 {
        self.0
    }
}
