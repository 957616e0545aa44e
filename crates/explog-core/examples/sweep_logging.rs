//! Logging a small hyper-parameter sweep with explog-core.

use anyhow::Result;
use explog_core::{
    batch_from_rows, init_tracing, results, ExperimentLog, KeySelector, Nested, ResultsMode,
    RowRange, Specifier, Value,
};

fn main() -> Result<()> {
    init_tracing("info");

    // 1. Open (or create) a file-backed log
    let mut log = ExperimentLog::open("./experiments/sweep.explog")?;

    // 2. Log a loss curve for every configuration of the sweep
    for lr in [0.1, 0.01, 0.001] {
        for opt in ["sgd", "adam"] {
            let conf = Specifier::fields([("lr", Value::from(lr)), ("opt", Value::from(opt))]);
            let curve: Vec<Vec<Value>> = (0..5)
                .map(|step| {
                    let loss = 1.0 / (1.0 + lr * 100.0 * step as f64);
                    vec![Value::from(step), Value::from(loss)]
                })
                .collect();
            let batch = batch_from_rows(&["step", "loss"], &curve)?;
            log.add_results("sweep", &conf, results([("curve", batch)]), ResultsMode::Append)?;
        }
    }

    // 3. Query: final loss of every adam run
    let adam = log.select_results(
        "sweep",
        &Specifier::from("opt = 'adam'"),
        &KeySelector::from("curve"),
        RowRange::from(4..),
        None,
    )?;
    let Nested::Many(runs) = adam else {
        anyhow::bail!("a predicate always resolves to a list");
    };
    let confs = log.resolve("sweep", &Specifier::from("opt = 'adam'"))?.flatten();
    for (index, run) in confs.iter().zip(&runs) {
        if let Some(curve) = run.as_one().and_then(|set| set.get("curve")) {
            println!("conf {index}: final loss {:?}", curve.value(0, "loss"));
        }
    }

    // 4. Close to flush the image
    log.close()?;
    Ok(())
}
