use std::sync::Arc;
use std::time::Duration;

use lvbcache::accounting::MemAccounting;
use lvbcache::backend::ObjectAttr;
use lvbcache::backend::memory::{MemObject, MemObjectStore};
use lvbcache::lvb::LvbAttrs;
use lvbcache::lvb::wire::{ByteOrder, ReplyBuffers};
use lvbcache::{FilterLvb, LockResource, LvbError, LvbOps, ResId, UpdateOutcome};
use quickcheck::{QuickCheck, TestResult};

type Ops = FilterLvb<Arc<MemObjectStore>>;

fn setup(store: MemObjectStore) -> (Arc<MemObjectStore>, Arc<Ops>) {
    let store = Arc::new(store);
    let ops = FilterLvb::new(
        "ost0",
        store.clone(),
        Arc::new(MemAccounting::new(None)),
    );
    (store, Arc::new(ops))
}

fn live(size: u64, mtime: u64, atime: u64, ctime: u64, blocks: u64) -> ObjectAttr {
    ObjectAttr {
        size,
        mtime,
        atime,
        ctime,
        blocks,
        nlink: 1,
    }
}

/// Reply whose second buffer holds a big-endian LVB record.
fn reply(size: u64, mtime: u64, atime: u64, ctime: u64) -> ReplyBuffers {
    let mut reply = ReplyBuffers::new(ByteOrder::Big);
    reply.push(vec![0u8; 8]);
    let rec: Vec<u8> = [size, mtime, atime, ctime]
        .iter()
        .flat_map(|v| v.to_be_bytes())
        .collect();
    reply.push(rec);
    reply
}

async fn initialized(
    ops: &Ops,
    store: &MemObjectStore,
    id: ResId,
    attr: ObjectAttr,
) -> (Arc<MemObject>, Arc<LockResource>) {
    let obj = store.insert(id, attr);
    let res = Arc::new(LockResource::new(id));
    ops.init(&res).await.unwrap();
    (obj, res)
}

#[tokio::test]
async fn test_init_loads_every_field() {
    let (store, ops) = setup(MemObjectStore::new());
    let id = ResId::new(100, 0);
    let (_obj, res) = initialized(&ops, &store, id, live(100, 10, 7, 9, 16)).await;

    let lvb = res.lvb().await.unwrap();
    assert_eq!(lvb.size, 100);
    assert_eq!(lvb.mtime, 10);
    assert_eq!(lvb.atime, 7);
    assert_eq!(lvb.ctime, 9);
    assert_eq!(lvb.blocks, 16);
}

#[tokio::test]
async fn test_increase_only_ignores_smaller_remote_and_disk() {
    let (store, ops) = setup(MemObjectStore::new());
    let id = ResId::new(101, 0);
    let (obj, res) = initialized(&ops, &store, id, live(100, 10, 10, 10, 8)).await;

    // remote says 50, disk still says 100
    ops.update(&res, Some(&reply(50, 10, 10, 10)), 1, true)
        .await
        .unwrap();
    assert_eq!(res.lvb().await.unwrap().size, 100);

    // remote says 150, disk lags at 120
    obj.update(|a| a.size = 120);
    ops.update(&res, Some(&reply(150, 10, 10, 10)), 1, true)
        .await
        .unwrap();
    assert_eq!(res.lvb().await.unwrap().size, 150);
}

#[tokio::test]
async fn test_blocks_follow_disk_even_downwards() {
    let (store, ops) = setup(MemObjectStore::new());
    let id = ResId::new(102, 0);
    let (obj, res) = initialized(&ops, &store, id, live(4096, 1, 1, 1, 64)).await;

    obj.update(|a| a.blocks = 42);
    ops.update(&res, None, 0, false).await.unwrap();
    assert_eq!(res.lvb().await.unwrap().blocks, 42);

    obj.update(|a| a.blocks = 8);
    ops.update(&res, None, 0, true).await.unwrap();
    assert_eq!(res.lvb().await.unwrap().blocks, 8);
}

#[tokio::test]
async fn test_overwrite_mode_disk_wins() {
    let (store, ops) = setup(MemObjectStore::new());
    let id = ResId::new(103, 0);
    let (obj, res) = initialized(&ops, &store, id, live(1000, 50, 50, 50, 8)).await;

    obj.set_attr(live(90, 40, 41, 42, 2));
    ops.update(&res, Some(&reply(500, 60, 60, 60)), 1, false)
        .await
        .unwrap();
    let lvb = res.lvb().await.unwrap();
    assert_eq!(
        lvb.attrs(),
        LvbAttrs {
            size: 90,
            mtime: 40,
            atime: 41,
            ctime: 42
        }
    );
    assert_eq!(lvb.blocks, 2);
}

#[tokio::test]
async fn test_failed_init_then_teardown_frees_once() {
    let (store, ops) = setup(MemObjectStore::new());
    let id = ResId::new(104, 0);
    store.insert_negative(id);
    let res = LockResource::new(id);

    assert!(matches!(ops.init(&res).await, Err(LvbError::NotExist(_))));
    let lvb = res.lvb().await.expect("block survives failed init");
    assert!(lvb.is_err());
    assert!(lvbcache::lvb::is_lvb_err(lvb.wire_blocks()));

    ops.free(&res).await;
    ops.free(&res).await;
    assert!(res.lvb().await.is_none());
    assert_eq!(ops.accounting().in_use(), 0);
    assert_eq!(ops.accounting().max(), lvbcache::filter::LVB_ALLOC_SIZE);
}

#[tokio::test]
async fn test_update_without_init_reports_outcome() {
    let (_store, ops) = setup(MemObjectStore::new());
    let res = LockResource::new(ResId::new(105, 0));
    let out = ops
        .update(&res, Some(&reply(1, 1, 1, 1)), 1, true)
        .await
        .unwrap();
    assert_eq!(out, UpdateOutcome::Uninitialized);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_updates_do_not_interleave() {
    let (store, ops) =
        setup(MemObjectStore::with_read_delay(Duration::from_millis(5)));
    let id = ResId::new(106, 0);
    let (_obj, res) = initialized(&ops, &store, id, live(10, 10, 10, 10, 1)).await;
    // disk phase aborts, so only the replies decide the final state
    store.unlink(id);

    let a = LvbAttrs {
        size: 111,
        mtime: 1,
        atime: 111,
        ctime: 1,
    };
    let b = LvbAttrs {
        size: 2,
        mtime: 222,
        atime: 2,
        ctime: 222,
    };

    for _ in 0..10 {
        let mut tasks = Vec::new();
        for attrs in [a, b] {
            let ops = ops.clone();
            let res = res.clone();
            tasks.push(tokio::spawn(async move {
                let r = reply(attrs.size, attrs.mtime, attrs.atime, attrs.ctime);
                ops.update(&res, Some(&r), 1, false).await
            }));
        }
        for t in tasks {
            assert!(matches!(t.await.unwrap(), Err(LvbError::Stale(_))));
        }
        let got = res.lvb().await.unwrap().attrs();
        assert!(got == a || got == b, "torn lvb: {got:?}");
    }
}

type Step = (Option<(u64, u64)>, (u64, u64), u64);

fn monotonic_under_increase_only(steps: Vec<Step>) -> TestResult {
    if steps.is_empty() {
        return TestResult::discard();
    }
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    rt.block_on(async move {
        let (store, ops) = setup(MemObjectStore::new());
        let id = ResId::new(200, 0);
        let (obj, res) = initialized(&ops, &store, id, live(0, 0, 0, 0, 0)).await;

        let mut prev = res.lvb().await.unwrap();
        for (remote, (disk_size, disk_time), disk_blocks) in steps {
            obj.set_attr(live(disk_size, disk_time, disk_time, disk_time, disk_blocks));
            let r = remote.map(|(size, time)| reply(size, time, time, time));
            ops.update(&res, r.as_ref(), 1, true).await.unwrap();

            let cur = res.lvb().await.unwrap();
            if cur.size < prev.size
                || cur.mtime < prev.mtime
                || cur.atime < prev.atime
                || cur.ctime < prev.ctime
                || cur.blocks != disk_blocks
                || cur.size < disk_size
            {
                return TestResult::failed();
            }
            prev = cur;
        }
        TestResult::passed()
    })
}

#[test]
fn test_increase_only_is_monotonic() {
    QuickCheck::new()
        .tests(200)
        .quickcheck(monotonic_under_increase_only as fn(Vec<Step>) -> TestResult);
}
