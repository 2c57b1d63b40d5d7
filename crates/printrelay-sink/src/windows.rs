// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Win32 print spooler sink.
//
// Opens the printer by name and writes the job with the `RAW` datatype, so
// the spooler passes the bytes to the port monitor without rendering.

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::ptr;

use tracing::{debug, info, warn};
use windows_sys::Win32::Foundation::{ERROR_INSUFFICIENT_BUFFER, ERROR_INVALID_PRINTER_NAME, GetLastError};
use windows_sys::Win32::Graphics::Printing::{
    ClosePrinter, DOC_INFO_1W, EndDocPrinter, EndPagePrinter, EnumPrintersW, OpenPrinterW,
    PRINTER_ENUM_CONNECTIONS, PRINTER_ENUM_LOCAL, PRINTER_HANDLE, PRINTER_INFO_4W,
    StartDocPrinterW, StartPagePrinter, WritePrinter,
};

use printrelay_core::error::SinkError;

use crate::traits::{PrintSink, PrinterCatalog};

/// Job title shown in the Windows print queue.
const JOB_TITLE: &str = "printrelay job";

/// Spooler datatype that bypasses the print processor.
const RAW_DATATYPE: &str = "RAW";

/// Delivers raw jobs through the Win32 spooler API.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpoolerSink;

impl SpoolerSink {
    pub fn new() -> Self {
        Self
    }
}

/// Closes the printer handle on every exit path.
struct PrinterHandle(PRINTER_HANDLE);

impl Drop for PrinterHandle {
    fn drop(&mut self) {
        // SAFETY: the handle came from a successful OpenPrinterW and is
        // closed exactly once.
        unsafe {
            ClosePrinter(self.0);
        }
    }
}

fn wide(value: &str) -> Vec<u16> {
    OsStr::new(value)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

fn last_error(context: &str) -> SinkError {
    // SAFETY: reads thread-local error state only.
    let code = unsafe { GetLastError() };
    SinkError::DeliveryFailed(format!("{context} failed (win32 error {code})"))
}

/// Read a NUL-terminated UTF-16 string.
///
/// # Safety
///
/// `ptr` must be null or point at a NUL-terminated UTF-16 buffer.
unsafe fn from_wide_ptr(ptr: *const u16) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0;
    // SAFETY: guaranteed NUL-terminated by the caller.
    unsafe {
        while *ptr.add(len) != 0 {
            len += 1;
        }
        String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len))
    }
}

impl PrintSink for SpoolerSink {
    fn kind(&self) -> &'static str {
        "win32-spooler"
    }

    fn deliver(&self, printer_name: &str, data: &[u8]) -> Result<(), SinkError> {
        let name = wide(printer_name);
        let mut title = wide(JOB_TITLE);
        let mut datatype = wide(RAW_DATATYPE);

        let mut raw_handle = ptr::null_mut();
        // SAFETY: `name` is NUL-terminated and outlives the call.
        let opened = unsafe { OpenPrinterW(name.as_ptr(), &mut raw_handle, ptr::null()) };
        if opened == 0 {
            // SAFETY: reads thread-local error state only.
            let code = unsafe { GetLastError() };
            if code == ERROR_INVALID_PRINTER_NAME {
                warn!(printer = printer_name, "printer not installed");
                return Err(SinkError::NotFound(printer_name.to_string()));
            }
            return Err(SinkError::DeliveryFailed(format!(
                "OpenPrinter failed (win32 error {code})"
            )));
        }
        let handle = PrinterHandle(raw_handle);

        let doc_info = DOC_INFO_1W {
            pDocName: title.as_mut_ptr(),
            pOutputFile: ptr::null_mut(),
            pDatatype: datatype.as_mut_ptr(),
        };

        // SAFETY: the handle is open and `doc_info` points at live buffers.
        let job_id = unsafe { StartDocPrinterW(handle.0, 1, &doc_info as *const DOC_INFO_1W as _) };
        if job_id == 0 {
            return Err(last_error("StartDocPrinter"));
        }
        debug!(printer = printer_name, job_id, "spooler job opened");

        // SAFETY: a document is open on this handle.
        if unsafe { StartPagePrinter(handle.0) } == 0 {
            let err = last_error("StartPagePrinter");
            // SAFETY: closes the document opened above.
            unsafe { EndDocPrinter(handle.0) };
            return Err(err);
        }

        let mut offset = 0usize;
        while offset < data.len() {
            let chunk = &data[offset..];
            let len = u32::try_from(chunk.len()).unwrap_or(u32::MAX);
            let mut written = 0u32;
            // SAFETY: `chunk` is valid for `len` bytes.
            let ok = unsafe { WritePrinter(handle.0, chunk.as_ptr().cast(), len, &mut written) };
            if ok == 0 || written == 0 {
                let err = last_error("WritePrinter");
                // SAFETY: closes the page and document opened above.
                unsafe {
                    EndPagePrinter(handle.0);
                    EndDocPrinter(handle.0);
                }
                return Err(err);
            }
            offset += written as usize;
        }

        // SAFETY: page and document are open on this handle.
        let page_closed = unsafe { EndPagePrinter(handle.0) } != 0;
        let doc_closed = unsafe { EndDocPrinter(handle.0) } != 0;
        if !page_closed || !doc_closed {
            return Err(last_error("EndDocPrinter"));
        }

        info!(printer = printer_name, bytes = data.len(), job_id, "job spooled via Win32");
        Ok(())
    }
}

impl PrinterCatalog for SpoolerSink {
    fn list_printers(&self) -> Result<Vec<String>, SinkError> {
        let flags = PRINTER_ENUM_LOCAL | PRINTER_ENUM_CONNECTIONS;
        let mut needed = 0u32;
        let mut returned = 0u32;

        // SAFETY: a null buffer with size 0 asks for the required size.
        let ok = unsafe {
            EnumPrintersW(flags, ptr::null(), 4, ptr::null_mut(), 0, &mut needed, &mut returned)
        };
        if ok == 0 {
            // SAFETY: reads thread-local error state only.
            let code = unsafe { GetLastError() };
            if code != ERROR_INSUFFICIENT_BUFFER {
                return Err(SinkError::DeliveryFailed(format!(
                    "EnumPrinters failed (win32 error {code})"
                )));
            }
        }
        if needed == 0 {
            return Ok(Vec::new());
        }

        // u64 storage keeps the PRINTER_INFO_4W records aligned.
        let mut buffer = vec![0u64; (needed as usize).div_ceil(8)];
        // SAFETY: `buffer` holds at least `needed` bytes.
        let ok = unsafe {
            EnumPrintersW(
                flags,
                ptr::null(),
                4,
                buffer.as_mut_ptr().cast(),
                needed,
                &mut needed,
                &mut returned,
            )
        };
        if ok == 0 {
            // SAFETY: reads thread-local error state only.
            let code = unsafe { GetLastError() };
            return Err(SinkError::DeliveryFailed(format!(
                "EnumPrinters failed (win32 error {code})"
            )));
        }

        let records = buffer.as_ptr().cast::<PRINTER_INFO_4W>();
        let mut names = Vec::with_capacity(returned as usize);
        for index in 0..returned as usize {
            // SAFETY: the spooler wrote `returned` records into `buffer`.
            let record = unsafe { &*records.add(index) };
            // SAFETY: printer names are NUL-terminated strings inside `buffer`.
            names.push(unsafe { from_wide_ptr(record.pPrinterName) });
        }
        Ok(names)
    }
}
