//! Immutable descriptions of the desired tree.

use std::fmt;
use std::panic::Location;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::component::{ComponentDef, ComponentDefinition};
use crate::error::ComponentError;
use crate::host::HostNodeId;
use crate::lifecycle::{Component, StatefulDefinition};
use crate::props::{PropKey, PropValue, Props};

/// Prop key a portal reads its target host node from.
pub const PORTAL_TARGET: &str = "target";

/// Identity of a child within its parent's [`Children`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum ChildKey {
    Name(Rc<str>),
    Index(usize),
}

impl From<&str> for ChildKey {
    fn from(name: &str) -> Self {
        ChildKey::Name(Rc::from(name))
    }
}

impl From<String> for ChildKey {
    fn from(name: String) -> Self {
        ChildKey::Name(Rc::from(name))
    }
}

impl From<usize> for ChildKey {
    fn from(index: usize) -> Self {
        ChildKey::Index(index)
    }
}

impl fmt::Debug for ChildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildKey::Name(name) => write!(f, "{name:?}"),
            ChildKey::Index(index) => write!(f, "#{index}"),
        }
    }
}

impl fmt::Display for ChildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildKey::Name(name) => f.write_str(name),
            ChildKey::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Anything that may stand where an element is expected.
#[derive(Clone, Debug)]
pub enum Renderable {
    Element(Element),
    /// Renders nothing; lets `condition && element` style code compose.
    Bool(bool),
    /// The null element. Reconciling toward it unmounts.
    Empty,
}

impl Renderable {
    pub fn element(&self) -> Option<&Element> {
        match self {
            Renderable::Element(element) => Some(element),
            Renderable::Bool(_) | Renderable::Empty => None,
        }
    }

    pub fn is_nothing(&self) -> bool {
        self.element().is_none()
    }
}

impl From<Element> for Renderable {
    fn from(element: Element) -> Self {
        Renderable::Element(element)
    }
}

impl From<bool> for Renderable {
    fn from(value: bool) -> Self {
        Renderable::Bool(value)
    }
}

impl From<Option<Element>> for Renderable {
    fn from(element: Option<Element>) -> Self {
        element.map_or(Renderable::Empty, Renderable::Element)
    }
}

/// Keyed children of an element, in declaration order.
#[derive(Clone, Default)]
pub struct Children(Rc<IndexMap<ChildKey, Renderable>>);

impl Children {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ChildKey) -> Option<&Renderable> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChildKey, &Renderable)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ChildKey> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<K: Into<ChildKey>, R: Into<Renderable>> FromIterator<(K, R)> for Children {
    fn from_iter<I: IntoIterator<Item = (K, R)>>(iter: I) -> Self {
        Children(Rc::new(
            iter.into_iter()
                .map(|(key, child)| (key.into(), child.into()))
                .collect(),
        ))
    }
}

impl fmt::Debug for Children {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

type RenderFn = dyn Fn(&Props) -> Result<Renderable, ComponentError>;

/// A stateless render function.
///
/// Identity is the allocation: clones of one `FunctionComponent` are the same
/// component, two separately created ones are not, even with the same name.
#[derive(Clone)]
pub struct FunctionComponent {
    name: Rc<str>,
    render: Rc<RenderFn>,
}

impl FunctionComponent {
    pub fn new(
        name: &str,
        render: impl Fn(&Props) -> Result<Renderable, ComponentError> + 'static,
    ) -> Self {
        Self {
            name: Rc::from(name),
            render: Rc::new(render),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_rc(&self) -> Rc<str> {
        Rc::clone(&self.name)
    }

    pub fn render(&self, props: &Props) -> Result<Renderable, ComponentError> {
        (self.render)(props)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.render, &other.render)
    }
}

#[derive(Clone)]
pub enum ElementKind {
    Host(Rc<str>),
    Function(FunctionComponent),
    Stateful(ComponentDef),
    Portal,
    Fragment,
}

impl ElementKind {
    /// Whether a handle of kind `self` may be reconciled in place toward `other`.
    pub fn same_component(&self, other: &ElementKind) -> bool {
        match (self, other) {
            (ElementKind::Host(a), ElementKind::Host(b)) => a == b,
            (ElementKind::Function(a), ElementKind::Function(b)) => a.ptr_eq(b),
            (ElementKind::Stateful(a), ElementKind::Stateful(b)) => a.same_definition(b),
            (ElementKind::Portal, ElementKind::Portal) => true,
            (ElementKind::Fragment, ElementKind::Fragment) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Host(class) => write!(f, "host `{class}`"),
            ElementKind::Function(component) => write!(f, "function `{}`", component.name()),
            ElementKind::Stateful(definition) => write!(f, "component `{}`", definition.name()),
            ElementKind::Portal => f.write_str("portal"),
            ElementKind::Fragment => f.write_str("fragment"),
        }
    }
}

struct ElementInner {
    kind: ElementKind,
    props: Props,
    location: &'static Location<'static>,
}

/// An immutable `{component, props}` pair.
///
/// Cloning is cheap and clones share identity; reconciling a handle toward
/// the element it already reflects does nothing.
#[derive(Clone)]
pub struct Element(Rc<ElementInner>);

impl Element {
    #[track_caller]
    pub fn new(kind: ElementKind, props: Props) -> Self {
        Element(Rc::new(ElementInner {
            kind,
            props,
            location: Location::caller(),
        }))
    }

    #[track_caller]
    pub fn host(class: &str, props: Props) -> Self {
        Self::new(ElementKind::Host(Rc::from(class)), props)
    }

    #[track_caller]
    pub fn function(component: &FunctionComponent, props: Props) -> Self {
        Self::new(ElementKind::Function(component.clone()), props)
    }

    #[track_caller]
    pub fn stateful<C: Component>(props: Props) -> Self {
        Self::new(
            ElementKind::Stateful(ComponentDef::new(StatefulDefinition::<C>::new())),
            props,
        )
    }

    #[track_caller]
    pub fn component(definition: impl ComponentDefinition, props: Props) -> Self {
        Self::new(ElementKind::Stateful(ComponentDef::new(definition)), props)
    }

    #[track_caller]
    pub fn portal(target: HostNodeId, children: Children) -> Self {
        Self::new(
            ElementKind::Portal,
            Props::new()
                .with(PORTAL_TARGET, PropValue::Node(target))
                .with_children(children),
        )
    }

    #[track_caller]
    pub fn fragment(children: Children) -> Self {
        Self::new(ElementKind::Fragment, Props::new().with_children(children))
    }

    pub fn kind(&self) -> &ElementKind {
        &self.0.kind
    }

    pub fn props(&self) -> &Props {
        &self.0.props
    }

    /// Where this element was constructed.
    pub fn location(&self) -> &'static Location<'static> {
        self.0.location
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn host_class(&self) -> Option<&Rc<str>> {
        match &self.0.kind {
            ElementKind::Host(class) => Some(class),
            _ => None,
        }
    }

    pub(crate) fn portal_target(&self) -> Option<HostNodeId> {
        self.0
            .props
            .get(&PropKey::property(PORTAL_TARGET))
            .and_then(PropValue::as_node)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Element({} at {})", self.0.kind, self.0.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_keep_declaration_order() {
        let children: Children = [
            ("b", Renderable::Bool(false)),
            ("a", Renderable::Empty),
            ("c", Renderable::Bool(true)),
        ]
        .into_iter()
        .collect();
        let keys: Vec<String> = children.keys().map(ToString::to_string).collect();
        assert_eq!(keys, ["b", "a", "c"]);
    }

    #[test]
    fn host_kinds_compare_by_tag() {
        let frame = Element::host("Frame", Props::new());
        let other = Element::host("Frame", Props::new().with("Size", 2));
        let label = Element::host("Label", Props::new());
        assert!(frame.kind().same_component(other.kind()));
        assert!(!frame.kind().same_component(label.kind()));
        assert!(!frame.ptr_eq(&other));
        assert!(frame.ptr_eq(&frame.clone()));
    }

    #[test]
    fn function_kinds_compare_by_identity() {
        let render = FunctionComponent::new("Empty", |_| Ok(Renderable::Empty));
        let twin = FunctionComponent::new("Empty", |_| Ok(Renderable::Empty));
        let a = Element::function(&render, Props::new());
        let b = Element::function(&render, Props::new());
        let c = Element::function(&twin, Props::new());
        assert!(a.kind().same_component(b.kind()));
        assert!(!a.kind().same_component(c.kind()));
    }

    #[test]
    fn portal_reads_target_prop() {
        let portal = Element::portal(7, Children::new());
        assert_eq!(portal.portal_target(), Some(7));
        let broken = Element::new(ElementKind::Portal, Props::new().with(PORTAL_TARGET, "nope"));
        assert_eq!(broken.portal_target(), None);
    }

    #[test]
    fn elements_record_construction_site() {
        let element = Element::host("Frame", Props::new());
        assert_eq!(element.location().file(), file!());
    }
}
