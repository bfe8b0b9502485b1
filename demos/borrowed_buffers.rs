//! Example: Borrowed Buffers
//!
//! A stage that normally owns its workspace temporarily runs on a slice of a
//! larger allocation supplied by the caller, then resumes its own workspace.
//!
//! Run with:
//!
//! ```bash
//! cargo run --example borrowed_buffers
//! ```

use rust_ai_devmem::{
    allocate, copy_to_host, open_device, release, DeviceBuffer, DeviceConfig, DeviceMemory,
    Result,
};

/// Fill whatever buffer the handle currently exposes.
fn fill_stage(workspace: &mut DeviceBuffer<u32>, value: u32, len: usize) -> Result<()> {
    workspace.upload(&vec![value; len])
}

fn main() -> Result<()> {
    println!("=== Borrowed Buffers Example ===\n");

    let memory = open_device(
        &DeviceConfig::from_env()
            .with_host_fallback(true)
            .with_crate_name("borrowed-buffers-demo"),
    )?;
    println!("backend: {}", memory.name());

    let mut workspace: DeviceBuffer<u32> = DeviceBuffer::new(memory.clone());
    fill_stage(&mut workspace, 1, 8)?;
    let own = workspace.get();
    println!("own workspace:      {own:?} (capacity {})", workspace.capacity());

    // The caller hands over the second half of a 16-element arena.
    let arena = allocate::<u32, _>(memory.as_ref(), 16)?;
    workspace.set_external(arena.add(8));
    fill_stage(&mut workspace, 7, 8)?;
    println!("borrowed slice:     {:?}", workspace.get());

    let mut host = [0u32; 16];
    copy_to_host(memory.as_ref(), Some(&mut host[..]), arena, 16)?;
    println!("arena contents:     {host:?}");

    workspace.unset_external();
    assert_eq!(workspace.get(), own);
    println!("resumed workspace:  {:?}", workspace.get());

    drop(workspace);
    // SAFETY: the arena was allocated above and the borrowing handle is gone.
    unsafe { release(memory.as_ref(), arena) };

    println!("\n=== Example Complete ===");
    Ok(())
}
