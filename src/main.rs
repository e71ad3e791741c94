#[cfg(not(windows))]
fn main() {
    eprintln!("memprobe only works against Windows targets");
    std::process::exit(1);
}

#[cfg(windows)]
fn main() {
    windows_main::main()
}

#[cfg(windows)]
mod windows_main {
    use std::error::Error as _;

    use clap::{Parser, Subcommand};
    use tracing_subscriber::EnvFilter;
    use windows::Win32::System::Threading::{
        PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION, PROCESS_VM_READ, PROCESS_VM_WRITE,
    };

    use memprobe::{Error, MemoryAccessor, ProcessHandle, RegionMap};

    /// Inspect and patch the memory of a running process.
    #[derive(Parser)]
    #[command(name = "memprobe", version)]
    struct Cli {
        /// Executable name of the target process (case-insensitive).
        process: String,

        #[command(subcommand)]
        command: Command,
    }

    #[derive(Subcommand)]
    enum Command {
        /// List the committed, readable memory regions of the target.
        Regions,
        /// Validate and read bytes at an address.
        Read {
            #[arg(value_parser = parse_address)]
            address: usize,
            /// Number of bytes to read.
            #[arg(long, default_value_t = 4)]
            size: usize,
        },
        /// Validate and write a 32-bit value at an address.
        Write {
            #[arg(value_parser = parse_address)]
            address: usize,
            value: i32,
        },
        /// Find the first writable region and plant a 32-bit value there.
        Auto { value: i32 },
    }

    fn parse_address(s: &str) -> Result<usize, String> {
        let trimmed = s.trim_start_matches("0x").trim_start_matches("0X");
        usize::from_str_radix(trimmed, 16).map_err(|e| format!("invalid hex address {s:?}: {e}"))
    }

    pub fn main() {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .init();

        let cli = Cli::parse();
        if let Err(e) = run(cli) {
            eprintln!("error: {e}");
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            std::process::exit(1);
        }
    }

    fn run(cli: Cli) -> memprobe::Result<()> {
        let mut accessor = MemoryAccessor::<ProcessHandle>::new(cli.process.as_str());
        accessor.open(
            PROCESS_QUERY_INFORMATION | PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION,
        )?;

        match cli.command {
            Command::Regions => {
                print_regions(&accessor.memory_regions()?);
            }
            Command::Read { address, size } => {
                if !accessor.is_address_valid(address, size)? {
                    return Err(Error::RegionInaccessible { address });
                }
                let bytes = accessor.read(address, size)?.to_vec();
                print!("{address:#018x}:");
                for byte in &bytes {
                    print!(" {byte:02x}");
                }
                println!();
                if size == size_of::<i32>() {
                    println!("as i32: {}", accessor.decode::<i32>()?);
                }
            }
            Command::Write { address, value } => {
                if !accessor.is_address_valid(address, size_of::<i32>())? {
                    return Err(Error::RegionInaccessible { address });
                }
                accessor.write(&value.to_le_bytes(), address)?;
                println!("wrote {value} to {address:#x}");
            }
            Command::Auto { value } => {
                let address = accessor.scan_and_write(&value.to_le_bytes())?;
                println!("wrote {value} to {address:#x}");
            }
        }

        Ok(())
    }

    fn print_regions(regions: &RegionMap) {
        println!(
            "{:>18} {:>14} {:>8} {:>30} {:>8}",
            "Base Address", "Region Size", "State", "Protect", "Type"
        );
        for region in regions.values() {
            println!(
                "{:#18x} {:>14} {:>8} {:>30} {:>8}",
                region.base_address(),
                region.size(),
                region.state().to_string(),
                region.protection().to_string(),
                region.kind().to_string(),
            );
        }
    }
}
