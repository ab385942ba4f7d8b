//! Subcommand handlers. These drive a live Windows process.

use anyhow::{anyhow, bail, Context};
use std::path::{Path, PathBuf};

use kinput_ctrl::process::{module_file_name, INJECTION_ACCESS, QUERY_ACCESS};
use kinput_ctrl::*;

use crate::config::Config;

/// Find the target process by PID or by name (first match).
pub fn find_target(process: &str) -> anyhow::Result<ProcessInfo> {
    println!("🔍 Searching for process: {}", process);

    if let Ok(pid) = process.parse::<u32>() {
        return ProcessEnumerator::find_by_pid(pid)
            .with_context(|| format!("Failed to find process {}", pid));
    }

    let processes = ProcessEnumerator::find_by_name(process)
        .context("Failed to enumerate processes")?;

    if processes.len() > 1 {
        println!("⚠️  Found {} processes with that name:", processes.len());
        for (i, info) in processes.iter().enumerate() {
            println!("   {}. PID {} - {}", i + 1, info.pid, info.name);
        }
        println!("   Using the first one (PID {})", processes[0].pid);
    }

    processes
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No processes found with name: {}", process))
}

pub fn list_modules(process: &str) -> anyhow::Result<()> {
    let target = find_target(process)?;
    let modules = ModuleEnumerator::enumerate(target.pid)?;

    println!("✓ {} modules in {} (PID {}):", modules.len(), target.name, target.pid);
    for module in &modules {
        println!(
            "   0x{:016X}  {:>10}  {}",
            module.base, module.size, module.path
        );
    }
    Ok(())
}

pub fn resolve(process: &str, module: &str, function: &str, config: &Config) -> anyhow::Result<()> {
    let target = find_target(process)?;
    let handle = ProcessHandle::open(target.pid, QUERY_ACCESS)?;
    ensure_architecture(&handle)?;

    let address = RemoteSymbolResolver::new(&handle)
        .with_max_forward_depth(config.max_forward_depth)
        .try_resolve(module, function)?;

    println!("✓ {}!{} = 0x{:X}", module, function, address);
    Ok(())
}

pub struct InjectOptions<'a> {
    pub call: Option<&'a str>,
    pub data: &'a [u8],
    pub free: bool,
}

pub fn inject(
    process: &str,
    dll_path: &Path,
    options: InjectOptions<'_>,
    config: &mut Config,
    config_path: &Path,
) -> anyhow::Result<()> {
    let target = find_target(process)?;
    println!("✓ Found process: {} (PID {})", target.name, target.pid);

    let dll_path = absolute_path(dll_path)?;
    if !dll_path.exists() {
        bail!("DLL file not found: {}", dll_path.display());
    }
    let path = dll_path.to_string_lossy();

    println!("\n🔓 Opening process handle...");
    let handle = ProcessHandle::open(target.pid, INJECTION_ACCESS).map_err(|e| {
        eprintln!("💡 Tip: You may need to run as Administrator for some processes");
        e
    })?;
    ensure_architecture(&handle)?;

    let mut injector = injector_for(handle, config);

    println!("\n💉 Loading {}...", dll_path.display());
    let module = injector.try_load_library(&path)?;
    println!("✅ Loaded at {}", module);

    config.add_recent_dll(dll_path.clone());
    if let Err(e) = config.save(config_path) {
        log::warn!("Failed to save config: {}", e);
    }

    if let Some(function) = options.call {
        report_call(
            injector.payload_library(),
            function,
            injector.try_call_export(&path, function, options.data)?,
        );
    }

    if options.free {
        injector.try_free_library(&path)?;
        println!("✅ Freed {}", dll_path.display());
    }

    Ok(())
}

/// Call a payload export on behalf of a library already loaded in the target.
pub fn call(
    process: &str,
    session_dll: &Path,
    function: &str,
    data: &[u8],
    config: &Config,
) -> anyhow::Result<()> {
    let target = find_target(process)?;
    let session_name = module_file_name(&session_dll.to_string_lossy()).to_string();

    let session = ModuleEnumerator::find_by_name(target.pid, &session_name)?
        .ok_or_else(|| anyhow!("{} is not loaded in PID {}", session_name, target.pid))?;

    let handle = ProcessHandle::open(target.pid, INJECTION_ACCESS)?;
    ensure_architecture(&handle)?;
    let injector = injector_for(handle, config);

    let result =
        injector.try_call_export_in(RemoteModule::new(session.base), function, data)?;
    report_call(injector.payload_library(), function, result);
    Ok(())
}

fn injector_for(handle: ProcessHandle, config: &Config) -> Injector<ProcessHandle> {
    Injector::with_process(handle)
        .with_payload_library(config.payload_library.clone())
        .with_max_forward_depth(config.max_forward_depth)
}

fn report_call(payload: &str, function: &str, result: bool) {
    if result {
        println!("✅ {}!{} returned TRUE", payload, function);
    } else {
        println!("⚠️  {}!{} returned FALSE", payload, function);
    }
}

fn ensure_architecture(handle: &ProcessHandle) -> anyhow::Result<()> {
    if !handle.matches_architecture()? {
        bail!(
            "PID {} does not match this {}-bit build",
            handle.pid(),
            usize::BITS
        );
    }
    Ok(())
}

fn absolute_path(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()
        .context("Failed to get current directory")?
        .join(path))
}
