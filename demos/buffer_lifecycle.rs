//! Example: Buffer Lifecycle
//!
//! Walks an owned device buffer through allocation, reuse, growth and drop,
//! printing what the backend saw at each step.
//!
//! Run with:
//!
//! ```bash
//! cargo run --example buffer_lifecycle
//! RUST_LOG=devmem=debug cargo run --example buffer_lifecycle
//! ```

use std::sync::Arc;

use rust_ai_devmem::{
    backend::HostMemory, init_logging, DeviceBuffer, LogConfig, Result,
};

fn main() -> Result<()> {
    init_logging(&LogConfig::development());
    println!("=== Buffer Lifecycle Example ===\n");

    let mem = Arc::new(HostMemory::new());
    let mut scratch = DeviceBuffer::<f32, _>::new(Arc::clone(&mem));
    println!("new:            {scratch:?}");

    // Batch sizes as they might arrive from a solver loop.
    for batch in [128usize, 64, 512, 256, 2048] {
        let before = scratch.get();
        scratch.ensure_capacity(batch)?;
        let action = if before == scratch.get() {
            "reused"
        } else {
            "reallocated"
        };
        println!(
            "batch {batch:>5}: {action:<11} capacity={:>5} ptr={:?}",
            scratch.capacity(),
            scratch.get()
        );
    }

    let stats = mem.stats();
    println!(
        "\nallocs={} frees={} live_bytes={} peak_bytes={}",
        stats.allocs, stats.frees, stats.live_bytes, stats.peak_bytes
    );

    drop(scratch);
    let stats = mem.stats();
    println!(
        "after drop:     allocs={} frees={} live_allocations={}",
        stats.allocs, stats.frees, stats.live_allocations
    );

    println!("\n=== Example Complete ===");
    Ok(())
}
