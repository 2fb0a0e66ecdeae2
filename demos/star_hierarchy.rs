use chrono::{Duration, TimeZone, Utc};
use coherent::{
    BottomUp, HierarchicalReconciler, MinTrace, MinTraceWeights, PanelFrame, ReconcileOptions,
    ReconciliationMethod, SummingMatrix, TagMap,
};

fn main() {
    // 1. A small retail hierarchy: one total over two regions
    let s = SummingMatrix::two_level("total", &["regionA", "regionB"]).unwrap();

    // 2. Long-format history: observed target per series and day
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let ids = ["total", "regionA", "regionB"];
    let n_hist = 4;
    let mut uid = Vec::new();
    let mut ds = Vec::new();
    for id in &ids {
        for t in 0..n_hist {
            uid.push(id.to_string());
            ds.push(start + Duration::days(t as i64));
        }
    }
    let y = vec![
        10.0, 12.0, 11.0, 13.0, // total
        6.0, 7.0, 6.5, 8.0, // regionA
        4.0, 5.0, 4.5, 5.0, // regionB
    ];
    let history = PanelFrame::new(uid, ds)
        .unwrap()
        .with_column("y", y)
        .unwrap();

    // 3. One-step-ahead base forecasts, deliberately incoherent (8 + 5 != 14),
    //    with a stated 80% lower bound for the "naive" model
    let f_uid: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    let f_ds = vec![start + Duration::days(n_hist as i64); 3];
    let forecasts = PanelFrame::new(f_uid, f_ds)
        .unwrap()
        .with_column("naive", vec![14.0, 8.0, 5.0])
        .unwrap()
        .with_column("naive-lo-80", vec![12.0, 6.7, 4.0])
        .unwrap();

    // 4. Reconcile with two methods at once, requesting 80% intervals
    let methods: Vec<Box<dyn ReconciliationMethod>> = vec![
        Box::new(BottomUp::new()),
        Box::new(MinTrace::new(MinTraceWeights::Ols)),
    ];
    let out = HierarchicalReconciler::new(methods)
        .reconcile(
            &forecasts,
            &history,
            &s,
            &TagMap::new(),
            &ReconcileOptions::new().with_levels(vec![80.0]),
        )
        .unwrap();

    for name in out.column_names() {
        println!("{name:>24}: {:?}", out.column(name).unwrap());
    }

    // 5. Outputs are coherent: the total equals the sum of the regions
    let bu = out.column("naive/BottomUp").unwrap();
    println!("bottom-up total {} = {} + {}", bu[0], bu[1], bu[2]);
}
