//! iopin test client
//!
//! Drives a single `/dev/iopin<pin>` node from an interactive menu.
//!
//! # Usage
//!
//! ```bash
//! iopin-client /dev/iopin17
//! ```
//!
//! Waiting for an event blocks in `poll(2)` until the driver reports the
//! pin readable, then reads the level, which consumes the event.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Read, Write};
use std::os::fd::AsRawFd;

use iopin::iopin::ioctl::{IOCTL_SET_FUNCTION, IOCTL_SET_INTERRUPTION, IOCTL_SET_PULL};
use nix::poll::{poll, PollFd, PollFlags};

nix::ioctl_write_int_bad!(iopin_set_function, IOCTL_SET_FUNCTION);
nix::ioctl_write_int_bad!(iopin_set_interruption, IOCTL_SET_INTERRUPTION);
nix::ioctl_write_int_bad!(iopin_set_pull, IOCTL_SET_PULL);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuOption {
    Exit,
    Write,
    Read,
    SetFunction,
    SetInterruption,
    SetPull,
    WaitEvent,
}

impl MenuOption {
    fn parse(input: &str) -> Option<MenuOption> {
        match input.trim().parse::<u32>().ok()? {
            0 => Some(MenuOption::Exit),
            1 => Some(MenuOption::Write),
            2 => Some(MenuOption::Read),
            3 => Some(MenuOption::SetFunction),
            4 => Some(MenuOption::SetInterruption),
            5 => Some(MenuOption::SetPull),
            6 => Some(MenuOption::WaitEvent),
            _ => None,
        }
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let Some(path) = device_path(&args) else {
        eprintln!("Wrong usage!");
        eprintln!("Use:");
        eprintln!("\t{} <file-name>", program_name(&args));
        std::process::exit(1);
    };

    let mut device = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Error opening '{}': {}", path, describe(&e));
            std::process::exit(1);
        }
    };

    let stdin = io::stdin();
    let mut input = stdin.lock();

    loop {
        print_menu();
        let Some(line) = prompt(&mut input, "Option: ") else {
            break;
        };

        match MenuOption::parse(&line) {
            Some(MenuOption::Exit) => break,
            Some(MenuOption::Write) => {
                let Some(value) = prompt(&mut input, "Value = ") else {
                    break;
                };
                let byte = value.trim().bytes().next().unwrap_or(b'0');
                if let Err(e) = device.write_all(&[byte]) {
                    println!("Write failed: {}", describe(&e));
                }
            }
            Some(MenuOption::Read) => read_value(&mut device),
            Some(MenuOption::SetFunction) => {
                set_option(&mut input, &device, "0 input, 1 output", iopin_set_function)
            }
            Some(MenuOption::SetInterruption) => set_option(
                &mut input,
                &device,
                "1 rising, 2 falling, 4 high, 8 low (OR them)",
                iopin_set_interruption,
            ),
            Some(MenuOption::SetPull) => {
                set_option(&mut input, &device, "0 off, 1 down, 2 up", iopin_set_pull)
            }
            Some(MenuOption::WaitEvent) => wait_event(&mut device),
            None => println!("Unknown option"),
        }
    }
}

/// The single device argument, if exactly one was given.
fn device_path(args: &[String]) -> Option<&str> {
    match args {
        [_, path] => Some(path.as_str()),
        _ => None,
    }
}

fn program_name(args: &[String]) -> &str {
    args.first().map(String::as_str).unwrap_or("iopin-client")
}

fn print_menu() {
    println!("[ 1] - Write value");
    println!("[ 2] - Read value");
    println!("[ 3] - Set function");
    println!("[ 4] - Set interruption");
    println!("[ 5] - Set pull");
    println!("[ 6] - Wait for event");
    println!("[ 0] - Exit");
}

/// Print `label` and read one line. `None` on end of input.
fn prompt(input: &mut impl BufRead, label: &str) -> Option<String> {
    print!("{}", label);
    io::stdout().flush().ok()?;

    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line),
    }
}

fn read_value(device: &mut File) {
    let mut buf = [0u8; 1];
    match device.read(&mut buf) {
        Ok(0) => println!("Nothing read"),
        Ok(_) => println!("Value = {}", buf[0] as char),
        Err(e) => println!("Read failed: {}", describe(&e)),
    }
}

fn set_option(
    input: &mut impl BufRead,
    device: &File,
    hint: &str,
    request: unsafe fn(i32, i32) -> nix::Result<i32>,
) {
    let Some(line) = prompt(input, &format!("Value ({}) = ", hint)) else {
        return;
    };
    let Ok(value) = line.trim().parse::<i32>() else {
        println!("Not a number");
        return;
    };

    // SAFETY: the request takes its argument by value; no memory is shared
    // with the driver.
    if let Err(e) = unsafe { request(device.as_raw_fd(), value) } {
        println!("Ioctl failed: ({}) {}", e as i32, e.desc());
    }
}

fn wait_event(device: &mut File) {
    println!("Waiting for event...");
    let mut fds = [PollFd::new(device.as_raw_fd(), PollFlags::POLLIN)];

    match poll(&mut fds, -1) {
        Ok(_) => {
            let ready = fds[0].revents().unwrap_or(PollFlags::empty());
            if ready.contains(PollFlags::POLLIN) {
                read_value(device);
            }
        }
        Err(e) => println!("Poll failed: ({}) {}", e as i32, e.desc()),
    }
}

fn describe(e: &io::Error) -> String {
    match e.raw_os_error() {
        Some(code) => format!("({}) {}", code, e),
        None => e.to_string(),
    }
}
