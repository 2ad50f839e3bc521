//! Property tests for the shape of mounted trees: the host tree a reconciler
//! ends up with depends only on the element tree it was last given.

use std::collections::BTreeMap;

use proptest::prelude::*;
use trellis_core::{Children, Element, HandleId, MemoryHost, Props, Reconciler};

/// Child key -> (badge instead of label, text).
type Layout = BTreeMap<String, (bool, i64)>;

fn layout_strategy() -> impl Strategy<Value = Layout> {
    proptest::collection::btree_map("[a-f]{1,2}", (proptest::bool::ANY, 0i64..100), 0..8)
}

fn panel(entries: &[(String, (bool, i64))]) -> Element {
    let children: Children = entries
        .iter()
        .map(|(key, (badge, text))| {
            let class = if *badge { "Badge" } else { "Label" };
            (
                key.as_str(),
                Element::host(class, Props::new().with("Text", text.to_string())),
            )
        })
        .collect();
    Element::host("Panel", Props::new().with_children(children))
}

/// Key -> (class, text) of every child under `root`, read back from the host.
fn shape(
    host: &MemoryHost,
    reconciler: &Reconciler<MemoryHost>,
    root: HandleId,
) -> BTreeMap<String, (String, Option<String>)> {
    reconciler
        .children(root)
        .into_iter()
        .filter_map(|child| reconciler.handle(child))
        .filter_map(|snapshot| {
            let node = snapshot.host_node?;
            let key = snapshot.key?.to_string();
            let class = host.class_name(node)?.to_string();
            let text = host
                .property(node, "Text")
                .and_then(|value| value.as_str().map(str::to_owned));
            Some((key, (class, text)))
        })
        .collect()
}

fn expected(layout: &Layout) -> BTreeMap<String, (String, Option<String>)> {
    layout
        .iter()
        .map(|(key, (badge, text))| {
            let class = if *badge { "Badge" } else { "Label" };
            (key.clone(), (class.to_string(), Some(text.to_string())))
        })
        .collect()
}

fn mount(entries: &[(String, (bool, i64))]) -> (MemoryHost, Reconciler<MemoryHost>, HandleId) {
    let host = MemoryHost::new();
    let reconciler = Reconciler::new(host.clone());
    let root = reconciler
        .mount(panel(entries), None, None)
        .expect("mount succeeds")
        .expect("panel renders");
    (host, reconciler, root)
}

fn shuffled_layout() -> impl Strategy<Value = (Layout, Vec<(String, (bool, i64))>)> {
    layout_strategy().prop_flat_map(|layout| {
        let entries: Vec<_> = layout.clone().into_iter().collect();
        (Just(layout), Just(entries).prop_shuffle())
    })
}

proptest! {
    #[test]
    fn mounted_shape_ignores_declaration_order((layout, entries) in shuffled_layout()) {
        let (host, reconciler, root) = mount(&entries);
        prop_assert_eq!(shape(&host, &reconciler, root), expected(&layout));

        let root_node = reconciler.host_node(root).expect("panel has a node");
        prop_assert_eq!(host.children(root_node).len(), layout.len());
        prop_assert_eq!(host.node_count(), layout.len() + 1);
        prop_assert_eq!(reconciler.handle_count(), layout.len() + 1);
    }

    #[test]
    fn reconciling_converges_to_a_fresh_mount(before in layout_strategy(), after in layout_strategy()) {
        let before: Vec<_> = before.into_iter().collect();
        let after_entries: Vec<_> = after.clone().into_iter().collect();

        let (host, reconciler, root) = mount(&before);
        let same_root = reconciler
            .reconcile(root, panel(&after_entries))
            .expect("reconcile succeeds");
        prop_assert_eq!(same_root, Some(root));

        let (fresh_host, fresh, fresh_root) = mount(&after_entries);
        prop_assert_eq!(
            shape(&host, &reconciler, root),
            shape(&fresh_host, &fresh, fresh_root)
        );
        prop_assert_eq!(shape(&host, &reconciler, root), expected(&after));
        prop_assert_eq!(host.node_count(), fresh_host.node_count());
        prop_assert_eq!(reconciler.handle_count(), fresh.handle_count());
    }

    #[test]
    fn unmount_leaves_nothing_behind(layout in layout_strategy()) {
        let entries: Vec<_> = layout.into_iter().collect();
        let (host, reconciler, root) = mount(&entries);
        reconciler.unmount(root).expect("unmount succeeds");
        prop_assert_eq!(host.node_count(), 0);
        prop_assert_eq!(reconciler.handle_count(), 0);
        prop_assert!(!reconciler.is_mounted(root));
    }
}
