use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;
use std::rc::Rc;

use anyhow::bail;
use anyhow::Context as _;
use anyhow::Result;

use tracecore::mapping::BuildId;
use tracecore::mapping::CreateMappingParams;
use tracecore::mapping::JitCache;
use tracecore::mapping::JitDelegateRef;
use tracecore::mapping::MappingTracker;
use tracecore::storage::FrameId;
use tracecore::storage::MappingId;
use tracecore::Addr;
use tracecore::AddressRange;
use tracecore::Upid;

use tracing::debug;


/// Parse an address from a string.
fn parse_addr(s: &str) -> Result<Addr> {
    // In our world addresses are always represented in hex, with or without 0x
    // prefix.
    Addr::from_str_radix(s.trim_start_matches("0x"), 16)
        .with_context(|| format!("failed to parse address: {s}"))
}

fn parse_upid(s: &str) -> Result<Upid> {
    s.parse::<Upid>()
        .with_context(|| format!("failed to parse process id: {s}"))
}

fn parse_range(start: &str, end: &str) -> Result<AddressRange> {
    let start = parse_addr(start)?;
    let end = parse_addr(end)?;
    if start > end {
        bail!("invalid address range: {start:#x} > {end:#x}")
    }
    Ok(AddressRange::new(start, end))
}

fn parse_build_id(s: Option<&&str>) -> Result<Option<BuildId>> {
    s.map(|s| BuildId::from_hex(s).with_context(|| format!("invalid build id: {s}")))
        .transpose()
}


/// Feeds events into a [`MappingTracker`].
#[derive(Debug, Default)]
pub struct Loader {
    tracker: MappingTracker,
    jit_caches: HashMap<Upid, Vec<Rc<RefCell<JitCache>>>>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    fn jit_cache(&self, upid: Upid, range: AddressRange) -> Option<&Rc<RefCell<JitCache>>> {
        self.jit_caches
            .get(&upid)?
            .iter()
            .find(|cache| cache.borrow().range().contains_range(&range))
    }

    fn frame(&mut self, target: &str, addr: Addr, function: &str) -> Result<FrameId> {
        let mapping = if target == "kernel" {
            self.kernel_mapping(addr)?
        } else {
            let upid = parse_upid(target)?;
            self.tracker
                .find_user_mapping_for_address(upid, addr)?
                .with_context(|| format!("no mapping for address {addr:#x} in process {upid}"))?
        };

        let rel_pc = self
            .tracker
            .mapping(mapping)
            .map(|vmm| vmm.to_relative_pc(addr))
            .with_context(|| format!("mapping {mapping} does not exist"))?;
        let frame = self.tracker.intern_frame(mapping, rel_pc, function)?;
        Ok(frame)
    }

    fn kernel_mapping(&mut self, addr: Addr) -> Result<MappingId> {
        if let Some(mapping) = self.tracker.find_kernel_mapping_for_address(addr) {
            return Ok(mapping)
        }
        if self.tracker.kernel_mapping().is_some() {
            bail!("no kernel mapping for address {addr:#x}")
        }
        Ok(self.tracker.get_or_create_kernel_memory_mapping_default())
    }

    /// Process a single event line.
    pub fn process_line(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(())
        }

        let tokens = line.split_whitespace().collect::<Vec<_>>();
        match tokens.as_slice() {
            ["kernel", start, end, name, rest @ ..] if rest.len() <= 1 => {
                let range = parse_range(start, end)?;
                let mut params = CreateMappingParams::new(range, *name);
                params.build_id = parse_build_id(rest.first())?;
                let _mapping = self.tracker.create_kernel_memory_mapping(params)?;
            }
            ["mmap", upid, start, end, offset, name, rest @ ..] if rest.len() <= 1 => {
                let upid = parse_upid(upid)?;
                let range = parse_range(start, end)?;
                let offset = parse_addr(offset)?;
                let mut params = CreateMappingParams::new(range, *name).with_offsets(offset, offset);
                params.build_id = parse_build_id(rest.first())?;
                let _mapping = self.tracker.create_user_memory_mapping(upid, params)?;
            }
            ["jitcache", upid, start, end, name] => {
                let upid = parse_upid(upid)?;
                let range = parse_range(start, end)?;
                let cache = Rc::new(RefCell::new(JitCache::new(*name, upid, range)));
                let () = self
                    .tracker
                    .add_jit_range(upid, range, Rc::clone(&cache) as JitDelegateRef)?;
                let () = self.jit_caches.entry(upid).or_default().push(cache);
            }
            ["jit", upid, start, end, function @ ..] if !function.is_empty() => {
                let upid = parse_upid(upid)?;
                let range = parse_range(start, end)?;
                let function = function.join(" ");
                let cache = self
                    .jit_cache(upid, range)
                    .with_context(|| format!("no JIT cache for {range} in process {upid}"))?;
                let () = cache.borrow_mut().load_code(range, &function)?;
            }
            ["frame", target, addr, function @ ..] => {
                let addr = parse_addr(addr)?;
                let frame = self.frame(target, addr, &function.join(" "))?;
                debug!("sample at {addr:#x} resolved to frame {frame}");
            }
            _ => bail!("malformed event: {line}"),
        }
        Ok(())
    }

    /// Process all events from `reader`.
    pub fn process<R>(&mut self, reader: R) -> Result<()>
    where
        R: BufRead,
    {
        for (idx, line) in reader.lines().enumerate() {
            let line = line.context("failed to read event")?;
            let () = self
                .process_line(&line)
                .with_context(|| format!("failed to process event on line {}", idx + 1))?;
        }
        Ok(())
    }

    /// Process all events from the file at `path`.
    pub fn process_file(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path)
            .with_context(|| format!("failed to open event file {}", path.display()))?;
        self.process(BufReader::new(file))
    }

    #[inline]
    pub fn tracker(&self) -> &MappingTracker {
        &self.tracker
    }
}
