use std::io::{self, stdout, Write};

use crossterm::{
    cursor::{RestorePosition, SavePosition},
    execute,
    style::Print,
    terminal::{Clear, ClearType},
};
use tokio::time::{sleep, Duration, Instant};

/// Blocks for the whole grace period, redrawing a one-line countdown
/// every second. Does not probe the instances.
pub async fn wait_for_instances(grace: Duration) -> io::Result<()> {
    log::info!("waiting {:?} for instances to become reachable", grace);

    let mut out = stdout();
    execute!(out, SavePosition)?;

    let deadline = Instant::now() + grace;
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let remaining = deadline - now;
        execute!(
            out,
            RestorePosition,
            Clear(ClearType::UntilNewLine),
            Print(format!(
                "Wait for EC2 instances to be ready...{}",
                remaining.as_secs()
            )),
        )?;
        sleep(remaining.min(Duration::from_secs(1))).await;
    }

    writeln!(out)?;
    Ok(())
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- wait::test_wait_for_instances --exact --show-output
#[test]
fn test_wait_for_instances() {
    let _ = env_logger::builder().is_test(true).try_init();

    macro_rules! ab {
        ($e:expr) => {
            tokio_test::block_on($e)
        };
    }

    let started = std::time::Instant::now();
    ab!(wait_for_instances(Duration::from_millis(1500))).unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(1500), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(5), "{:?}", elapsed);

    ab!(wait_for_instances(Duration::ZERO)).unwrap();
}
