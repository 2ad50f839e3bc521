use trellis_core::{
    ClassSchema, Component, ComponentError, Element, HostNodeId, InitContext, MemoryHost,
    PropValue, PropertySpec, Props, Reconciler, ReconcilerConfig, Renderable, Updater,
};

struct Counter {
    updater: Updater<Counter>,
}

impl Counter {
    fn button(&self, text: &str, delta: i64) -> Element {
        let updater = self.updater.clone();
        Element::host(
            "Button",
            Props::new().with("Text", text).on("Activated", move |_, _| {
                if let Err(err) = updater.update(move |count| *count += delta) {
                    log::error!("counter update failed: {err}");
                }
            }),
        )
    }
}

impl Component for Counter {
    type State = i64;

    fn init(_props: &Props, cx: &mut InitContext<Self>) -> Self {
        Counter {
            updater: cx.updater(),
        }
    }

    fn initial_state(props: &Props) -> i64 {
        props
            .property("start")
            .and_then(PropValue::as_int)
            .unwrap_or(0)
    }

    fn render(&self, props: &Props, count: &i64) -> Result<Renderable, ComponentError> {
        let overlay = props
            .property("overlay")
            .and_then(PropValue::as_node)
            .ok_or_else(|| ComponentError::new("counter needs an overlay node"))?;

        let mut children = vec![
            (
                "value",
                Element::host("Label", Props::new().with("Text", format!("Count: {count}"))),
            ),
            ("increment", self.button("Increment", 1)),
            ("decrement", self.button("Decrement", -1)),
        ];
        if *count >= 3 {
            children.push((
                "badge",
                Element::portal(
                    overlay,
                    [(
                        "toast",
                        Element::host("Label", Props::new().with("Text", "High score!")),
                    )]
                    .into_iter()
                    .collect(),
                ),
            ));
        }
        Ok(Element::host(
            "Column",
            Props::new().with_children(children.into_iter().collect()),
        )
        .into())
    }

    fn did_mount(&mut self, _props: &Props, count: &i64) {
        log::info!("counter mounted at {count}");
    }

    fn did_update(&mut self, _prev_props: &Props, prev_count: &i64) {
        log::info!("counter moved on from {prev_count}");
    }
}

fn find_button(host: &MemoryHost, column: HostNodeId, text: &str) -> Option<HostNodeId> {
    host.children(column).into_iter().find(|&child| {
        host.class_name(child).as_deref() == Some("Button")
            && host.property(child, "Text").as_ref().and_then(PropValue::as_str) == Some(text)
    })
}

fn main() {
    env_logger::init();

    println!("=== Trellis Counter Example ===");

    let host = MemoryHost::new()
        .with_class("Window", ClassSchema::new().property("Title", PropertySpec::new("")))
        .with_class("Column", ClassSchema::new())
        .with_class("Label", ClassSchema::new().property("Text", PropertySpec::new("")))
        .with_class(
            "Button",
            ClassSchema::new()
                .property("Text", PropertySpec::new(""))
                .event("Activated"),
        );
    let window = host.create_root("Window").expect("window root");
    let overlay = host.create_root("Window").expect("overlay root");

    let reconciler = Reconciler::with_config(host.clone(), ReconcilerConfig::from_env());
    let root = match reconciler.mount(
        Element::stateful::<Counter>(Props::new().with("overlay", PropValue::Node(overlay))),
        Some(window),
        Some("counter".into()),
    ) {
        Ok(Some(root)) => root,
        Ok(None) => {
            println!("counter rendered nothing");
            return;
        }
        Err(err) => {
            eprintln!("mount failed: {err}");
            return;
        }
    };

    let Some(column) = reconciler.resolve_host_node(root) else {
        eprintln!("counter has no host node");
        return;
    };
    print!("{}", host.dump_tree(Some(window)));

    let presses = [
        "Increment",
        "Increment",
        "Increment",
        "Decrement",
    ];
    for text in presses {
        let Some(button) = find_button(&host, column, text) else {
            eprintln!("no {text} button");
            return;
        };
        host.fire_event(button, "Activated", &[]);
        println!("\n-- after {text} --");
        print!("{}", host.dump_tree(Some(window)));
        print!("{}", host.dump_tree(Some(overlay)));
    }

    if let Err(err) = reconciler.unmount(root) {
        eprintln!("unmount failed: {err}");
    }
    println!(
        "\nafter unmount: {} host nodes, {} subscriptions",
        host.node_count(),
        host.subscription_count()
    );
}
