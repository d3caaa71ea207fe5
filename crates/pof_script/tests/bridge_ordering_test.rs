//! Integration test for event delivery across script nodes.

use pof_script::{
    AsyncEventQueue, CallKind, NodeFlags, ScriptArg, ScriptBridge, ScriptEngine, ScriptHost, ScriptSource, SearchPath,
};
use std::sync::Arc;
use std::thread;

const RECORDER: &str = "M.seen = {}; function M:record(v) table.insert(self.seen, v) end";

fn seen(engine: &ScriptEngine, node: &str) -> Vec<f64> {
    engine
        .with_lock(|lua| {
            let ns: mlua::Table = lua.globals().get(node)?;
            let list: mlua::Table = ns.get("seen")?;
            list.sequence_values::<f64>().collect::<mlua::Result<Vec<_>>>()
        })
        .unwrap()
}

#[test]
fn test_per_node_order_with_interleaving() {
    let engine = Arc::new(ScriptEngine::new(ScriptHost::default()).unwrap());

    let mut a = ScriptBridge::new(Arc::clone(&engine), "a", ScriptSource::inline(RECORDER), SearchPath::default());
    let mut b = ScriptBridge::new(Arc::clone(&engine), "b", ScriptSource::inline(RECORDER), SearchPath::default());
    a.load().unwrap();
    b.load().unwrap();

    let queue_a = AsyncEventQueue::new(Arc::new(NodeFlags::default()));
    let queue_b = AsyncEventQueue::new(Arc::new(NodeFlags::default()));

    let (sa, sb) = (queue_a.sender(), queue_b.sender());
    let producer = thread::spawn(move || {
        for i in 0..50_u32 {
            sa.call(CallKind::Method, "record", vec![ScriptArg::Number(f64::from(i))]);
            sb.call(CallKind::Method, "record", vec![ScriptArg::Number(f64::from(1000 + i))]);
        }
    });
    producer.join().unwrap();

    for event in queue_b.drain() {
        b.apply_event(event).unwrap();
    }
    for event in queue_a.drain() {
        a.apply_event(event).unwrap();
    }

    let expected_a: Vec<f64> = (0..50_u32).map(f64::from).collect();
    let expected_b: Vec<f64> = (1000..1050_u32).map(f64::from).collect();
    assert_eq!(seen(&engine, "a"), expected_a);
    assert_eq!(seen(&engine, "b"), expected_b);
}

#[test]
fn test_calls_from_other_thread_serialize() {
    let engine = Arc::new(ScriptEngine::new(ScriptHost::default()).unwrap());
    let mut bridge = ScriptBridge::new(
        Arc::clone(&engine),
        "c",
        ScriptSource::inline("M.n = 0; function M:bump() self.n = self.n + 1 end"),
        SearchPath::default(),
    );
    bridge.load().unwrap();
    let bridge = Arc::new(bridge);

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || {
                for _ in 0..250 {
                    bridge.dispatch(CallKind::Method, "bump", Vec::new()).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let n: i64 = engine
        .with_lock(|lua| lua.globals().get::<mlua::Table>("c")?.get("n"))
        .unwrap();
    assert_eq!(n, 1000);
}
