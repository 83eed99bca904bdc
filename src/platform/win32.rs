//! Win32 backend.
//!
//! Window and monitor I/O are direct user32/dwmapi calls. Notifications come
//! from a dedicated `layout-keeper-events` thread that owns a hidden top-level
//! window (display, power and session broadcasts are only delivered to
//! top-level windows) and the out-of-context WinEvent hooks, and pumps
//! messages until the subscription is released.

use std::cell::RefCell;
use std::ffi::c_void;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::mpsc;
use std::thread;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;
use windows::Win32::Foundation::CloseHandle;
use windows::Win32::Foundation::GetLastError;
use windows::Win32::Foundation::HINSTANCE;
use windows::Win32::Foundation::HWND;
use windows::Win32::Foundation::LPARAM;
use windows::Win32::Foundation::LRESULT;
use windows::Win32::Foundation::POINT;
use windows::Win32::Foundation::RECT;
use windows::Win32::Foundation::WPARAM;
use windows::Win32::Graphics::Dwm::DWMWA_CLOAKED;
use windows::Win32::Graphics::Dwm::DwmGetWindowAttribute;
use windows::Win32::Graphics::Gdi::EnumDisplayMonitors;
use windows::Win32::Graphics::Gdi::GetMonitorInfoW;
use windows::Win32::Graphics::Gdi::HDC;
use windows::Win32::Graphics::Gdi::HMONITOR;
use windows::Win32::Graphics::Gdi::MONITORINFOEXW;
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::RemoteDesktop::NOTIFY_FOR_THIS_SESSION;
use windows::Win32::System::RemoteDesktop::WTSRegisterSessionNotification;
use windows::Win32::System::RemoteDesktop::WTSUnRegisterSessionNotification;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::System::Threading::OpenProcess;
use windows::Win32::System::Threading::PROCESS_NAME_WIN32;
use windows::Win32::System::Threading::PROCESS_QUERY_LIMITED_INFORMATION;
use windows::Win32::System::Threading::QueryFullProcessImageNameW;
use windows::Win32::UI::Accessibility::HWINEVENTHOOK;
use windows::Win32::UI::Accessibility::SetWinEventHook;
use windows::Win32::UI::Accessibility::UnhookWinEvent;
use windows::Win32::UI::WindowsAndMessaging::CreateWindowExW;
use windows::Win32::UI::WindowsAndMessaging::DefWindowProcW;
use windows::Win32::UI::WindowsAndMessaging::DestroyWindow;
use windows::Win32::UI::WindowsAndMessaging::DispatchMessageW;
use windows::Win32::UI::WindowsAndMessaging::EnumWindows;
use windows::Win32::UI::WindowsAndMessaging::GetMessageW;
use windows::Win32::UI::WindowsAndMessaging::GetParent;
use windows::Win32::UI::WindowsAndMessaging::GetWindowPlacement;
use windows::Win32::UI::WindowsAndMessaging::GetWindowRect;
use windows::Win32::UI::WindowsAndMessaging::GetWindowTextLengthW;
use windows::Win32::UI::WindowsAndMessaging::GetWindowTextW;
use windows::Win32::UI::WindowsAndMessaging::GetWindowThreadProcessId;
use windows::Win32::UI::WindowsAndMessaging::IsWindowVisible;
use windows::Win32::UI::WindowsAndMessaging::MSG;
use windows::Win32::UI::WindowsAndMessaging::PostThreadMessageW;
use windows::Win32::UI::WindowsAndMessaging::RegisterClassW;
use windows::Win32::UI::WindowsAndMessaging::SET_WINDOW_POS_FLAGS;
use windows::Win32::UI::WindowsAndMessaging::SWP_ASYNCWINDOWPOS;
use windows::Win32::UI::WindowsAndMessaging::SWP_NOZORDER;
use windows::Win32::UI::WindowsAndMessaging::SetWindowPlacement;
use windows::Win32::UI::WindowsAndMessaging::SetWindowPos;
use windows::Win32::UI::WindowsAndMessaging::TranslateMessage;
use windows::Win32::UI::WindowsAndMessaging::UnregisterClassW;
use windows::Win32::UI::WindowsAndMessaging::WINDOW_EX_STYLE;
use windows::Win32::UI::WindowsAndMessaging::WINDOW_STYLE;
use windows::Win32::UI::WindowsAndMessaging::WINDOWPLACEMENT;
use windows::Win32::UI::WindowsAndMessaging::WINDOWPLACEMENT_FLAGS;
use windows::Win32::UI::WindowsAndMessaging::WNDCLASSW;
use windows::core::BOOL;
use windows::core::PCWSTR;
use windows::core::PWSTR;
use windows::core::w;

use super::DisplayTopology;
use super::Notifications;
use super::SetRectFlags;
use super::Subscription;
use super::WindowInventory;
use crate::error::PlatformError;
use crate::events::Event;
use crate::events::EventSink;
use crate::monitors::MonitorInfo;
use crate::monitors::Monitors;
use crate::types::Placement;
use crate::types::Point;
use crate::types::ProcessInfo;
use crate::types::Rect;
use crate::types::ShowState;
use crate::types::WindowHandle;
use crate::types::WindowInfo;

const EVENTS_THREAD: &str = "layout-keeper-events";

// WinEvent ids and flags
const EVENT_SYSTEM_FOREGROUND: u32 = 0x0003;
const EVENT_SYSTEM_CAPTUREEND: u32 = 0x0009;
const EVENT_SYSTEM_MOVESIZEEND: u32 = 0x000B;
const WINEVENT_OUTOFCONTEXT: u32 = 0x0000;
const OBJID_WINDOW: i32 = 0;

// Messages
const WM_QUIT: u32 = 0x0012;
const WM_DISPLAYCHANGE: u32 = 0x007E;
const WM_POWERBROADCAST: u32 = 0x0218;
const WM_WTSSESSION_CHANGE: u32 = 0x02B1;

// WM_POWERBROADCAST events
const PBT_APMSUSPEND: usize = 0x0004;
const PBT_APMRESUMEAUTOMATIC: usize = 0x0012;

// WM_WTSSESSION_CHANGE reasons
const WTS_SESSION_LOCK: usize = 0x7;
const WTS_SESSION_UNLOCK: usize = 0x8;

// DWMWA_CLOAKED values that hide a window from the user
const DWM_CLOAKED_APP: u32 = 0x1;
const DWM_CLOAKED_INHERITED: u32 = 0x4;

// WINDOWPLACEMENT.showCmd values
const SW_SHOWNORMAL: u32 = 1;
const SW_SHOWMINIMIZED: u32 = 2;
const SW_SHOWMAXIMIZED: u32 = 3;
const SW_MINIMIZE: u32 = 6;
const SW_SHOWMINNOACTIVE: u32 = 7;

const MONITORINFOF_PRIMARY: u32 = 1;

const ERROR_CLASS_ALREADY_EXISTS: i32 = 1410;

thread_local! {
    /// Sink for the events thread's window procedure and WinEvent callback.
    static SINK: RefCell<Option<EventSink>> = const { RefCell::new(None) };
}

fn to_hwnd(handle: WindowHandle) -> HWND { HWND(handle.0 as *mut c_void) }

fn to_handle(hwnd: HWND) -> WindowHandle { WindowHandle(hwnd.0 as isize) }

fn os_error(call: &'static str, err: &windows::core::Error) -> PlatformError {
    PlatformError::Os {
        call,
        code: err.code().0,
    }
}

fn last_os_error(call: &'static str) -> PlatformError {
    // SAFETY: GetLastError only reads thread-local state
    let code = unsafe { GetLastError() };
    PlatformError::Os {
        call,
        code: code.0 as i32,
    }
}

const fn rect_from(rect: &RECT) -> Rect { Rect::from_edges(rect.left, rect.top, rect.right, rect.bottom) }

const fn rect_to(rect: Rect) -> RECT {
    RECT {
        left:   rect.left,
        top:    rect.top,
        right:  rect.right(),
        bottom: rect.bottom(),
    }
}

fn placement_from(wp: &WINDOWPLACEMENT) -> Placement {
    let show_state = match wp.showCmd {
        SW_SHOWMINIMIZED | SW_MINIMIZE | SW_SHOWMINNOACTIVE => ShowState::Minimized,
        SW_SHOWMAXIMIZED => ShowState::Maximized,
        _ => ShowState::Normal,
    };
    Placement {
        show_state,
        normal_rect: rect_from(&wp.rcNormalPosition),
        min_position: Point::new(wp.ptMinPosition.x, wp.ptMinPosition.y),
        max_position: Point::new(wp.ptMaxPosition.x, wp.ptMaxPosition.y),
        flags: wp.flags.0,
    }
}

fn placement_to(placement: &Placement) -> WINDOWPLACEMENT {
    let show_cmd = match placement.show_state {
        ShowState::Normal => SW_SHOWNORMAL,
        ShowState::Minimized => SW_SHOWMINIMIZED,
        ShowState::Maximized => SW_SHOWMAXIMIZED,
    };
    WINDOWPLACEMENT {
        length: size_of::<WINDOWPLACEMENT>() as u32,
        flags: WINDOWPLACEMENT_FLAGS(placement.flags),
        showCmd: show_cmd,
        ptMinPosition: POINT {
            x: placement.min_position.x,
            y: placement.min_position.y,
        },
        ptMaxPosition: POINT {
            x: placement.max_position.x,
            y: placement.max_position.y,
        },
        rcNormalPosition: rect_to(placement.normal_rect),
    }
}

/// Whether DWM hides the window from the user (other virtual desktop,
/// suspended UWP app). Shell-cloaked windows still count as visible.
fn is_cloaked(hwnd: HWND) -> bool {
    let mut cloaked: u32 = 0;
    // SAFETY: the out pointer is a live u32 of the size passed
    let result = unsafe {
        DwmGetWindowAttribute(
            hwnd,
            DWMWA_CLOAKED,
            std::ptr::from_mut(&mut cloaked).cast(),
            size_of::<u32>() as u32,
        )
    };
    result.is_ok() && cloaked & (DWM_CLOAKED_APP | DWM_CLOAKED_INHERITED) != 0
}

fn window_title(hwnd: HWND) -> Option<String> {
    // SAFETY: plain reads of window state
    let len = unsafe { GetWindowTextLengthW(hwnd) };
    if len <= 0 {
        return None;
    }
    let mut buf = vec![0u16; len as usize + 1];
    // SAFETY: buf has room for the title and its terminator
    let copied = unsafe { GetWindowTextW(hwnd, &mut buf) };
    if copied <= 0 {
        return None;
    }
    Some(String::from_utf16_lossy(&buf[..copied as usize]))
}

/// Executable file stem of `process_id`, or an empty string when the
/// process cannot be queried.
fn process_name(process_id: u32) -> String {
    // SAFETY: the handle is closed before returning
    unsafe {
        let Ok(process) = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id) else {
            return String::new();
        };

        let mut buf = [0u16; 1024];
        let mut size = buf.len() as u32;
        let queried = QueryFullProcessImageNameW(
            process,
            PROCESS_NAME_WIN32,
            PWSTR(buf.as_mut_ptr()),
            &raw mut size,
        );
        if let Err(err) = CloseHandle(process) {
            trace!("[process_name] CloseHandle failed: {}", err);
        }
        if queried.is_err() {
            return String::new();
        }

        let path = String::from_utf16_lossy(&buf[..size as usize]);
        Path::new(&path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Visible, top-level, titled and not cloaked.
fn window_of_interest(hwnd: HWND) -> Option<WindowInfo> {
    // SAFETY: plain reads of window state
    let visible = unsafe { IsWindowVisible(hwnd) }.as_bool();
    if !visible {
        return None;
    }
    // SAFETY: as above
    let has_parent = matches!(unsafe { GetParent(hwnd) }, Ok(parent) if !parent.is_invalid());
    if has_parent || is_cloaked(hwnd) {
        return None;
    }
    let title = window_title(hwnd)?;

    let mut process_id = 0;
    // SAFETY: the out pointer is a live u32
    unsafe { GetWindowThreadProcessId(hwnd, Some(&raw mut process_id)) };

    Some(WindowInfo {
        handle: to_handle(hwnd),
        title,
        process: ProcessInfo {
            id:   process_id,
            name: process_name(process_id),
        },
    })
}

unsafe extern "system" fn enum_windows_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
    // SAFETY: lparam is the Vec passed to EnumWindows, alive for the call
    let windows = unsafe { &mut *(lparam.0 as *mut Vec<WindowInfo>) };
    if let Some(info) = window_of_interest(hwnd) {
        windows.push(info);
    }
    BOOL::from(true)
}

unsafe extern "system" fn enum_monitors_callback(
    hmonitor: HMONITOR,
    _hdc: HDC,
    _clip: *mut RECT,
    lparam: LPARAM,
) -> BOOL {
    // SAFETY: lparam is the Vec passed to EnumDisplayMonitors, alive for the call
    let monitors = unsafe { &mut *(lparam.0 as *mut Vec<MonitorInfo>) };

    let mut info = MONITORINFOEXW::default();
    info.monitorInfo.cbSize = size_of::<MONITORINFOEXW>() as u32;
    // SAFETY: MONITORINFOEXW starts with MONITORINFO and cbSize says which one it is
    let ok = unsafe { GetMonitorInfoW(hmonitor, std::ptr::from_mut(&mut info).cast()) };
    if ok.as_bool() {
        let len = info
            .szDevice
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(info.szDevice.len());
        monitors.push(MonitorInfo::new(
            String::from_utf16_lossy(&info.szDevice[..len]),
            rect_from(&info.monitorInfo.rcMonitor),
            info.monitorInfo.dwFlags & MONITORINFOF_PRIMARY != 0,
        ));
    } else {
        warn!("[enum_monitors_callback] GetMonitorInfoW failed, skipping monitor");
    }
    BOOL::from(true)
}

fn post_event(event: Event) {
    SINK.with_borrow(|sink| {
        if let Some(sink) = sink {
            sink.post(event);
        }
    });
}

unsafe extern "system" fn win_event_callback(
    _hook: HWINEVENTHOOK,
    event: u32,
    _hwnd: HWND,
    id_object: i32,
    _id_child: i32,
    _event_thread: u32,
    _event_time: u32,
) {
    if id_object != OBJID_WINDOW {
        return;
    }
    trace!("[win_event_callback] event 0x{:04X}", event);
    post_event(Event::WindowMoved);
}

fn translate_message(msg: u32, wparam: WPARAM) -> &'static [Event] {
    match (msg, wparam.0) {
        (WM_DISPLAYCHANGE, _) => &[Event::DisplaySettingsChanging, Event::DisplaySettingsChanged],
        (WM_POWERBROADCAST, PBT_APMSUSPEND) => &[Event::PowerSuspend],
        (WM_POWERBROADCAST, PBT_APMRESUMEAUTOMATIC) => &[Event::PowerResume],
        (WM_WTSSESSION_CHANGE, WTS_SESSION_LOCK) => &[Event::SessionLock],
        (WM_WTSSESSION_CHANGE, WTS_SESSION_UNLOCK) => &[Event::SessionUnlock],
        _ => &[],
    }
}

unsafe extern "system" fn window_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        for event in translate_message(msg, wparam) {
            debug!("[window_proc] {:?}", event);
            post_event(*event);
        }
    }));
    if result.is_err() {
        error!("[window_proc] panic while handling message 0x{:04X}", msg);
    }

    if msg == WM_POWERBROADCAST {
        return LRESULT(1);
    }
    // SAFETY: forwarding the arguments we were called with
    unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
}

fn events_class() -> PCWSTR { w!("WindowLayoutKeeperEvents") }

/// A class left registered by an earlier or concurrent subscription in this
/// process is reused.
fn class_registration(atom: u16, failure: impl FnOnce() -> PlatformError) -> Result<(), PlatformError> {
    if atom != 0 {
        return Ok(());
    }
    match failure() {
        PlatformError::Os {
            code: ERROR_CLASS_ALREADY_EXISTS,
            ..
        } => {
            debug!("[class_registration] reusing registered window class");
            Ok(())
        },
        err => Err(err),
    }
}

/// Registrations owned by the events thread, undone in reverse order on drop.
struct EventSources {
    instance: HINSTANCE,
    hwnd:     HWND,
    session:  bool,
    hooks:    Vec<HWINEVENTHOOK>,
}

impl Drop for EventSources {
    fn drop(&mut self) {
        // SAFETY: every handle was created on this thread and is released once
        unsafe {
            for hook in self.hooks.drain(..) {
                if !UnhookWinEvent(hook).as_bool() {
                    warn!("[EventSources::drop] UnhookWinEvent failed");
                }
            }
            let unregistered = if self.session {
                WTSUnRegisterSessionNotification(self.hwnd)
            } else {
                Ok(())
            };
            if let Err(err) = unregistered {
                warn!(
                    "[EventSources::drop] WTSUnRegisterSessionNotification failed: {}",
                    err
                );
            }
            if let Err(err) = DestroyWindow(self.hwnd) {
                warn!("[EventSources::drop] DestroyWindow failed: {}", err);
            }
            // fails while another subscription still has a window of this class
            if let Err(err) = UnregisterClassW(events_class(), Some(self.instance)) {
                debug!("[EventSources::drop] window class kept: {}", err);
            }
        }
        SINK.set(None);
        debug!("[EventSources::drop] notifications unregistered");
    }
}

/// Create the hidden window and hooks on the calling thread.
fn register_sources() -> Result<EventSources, PlatformError> {
    // SAFETY: standard window class registration and creation on this thread
    let (instance, hwnd) = unsafe {
        let module = GetModuleHandleW(None).map_err(|err| os_error("GetModuleHandleW", &err))?;
        let instance = HINSTANCE(module.0);
        let class = WNDCLASSW {
            lpfnWndProc: Some(window_proc),
            hInstance: instance,
            lpszClassName: events_class(),
            ..Default::default()
        };
        class_registration(RegisterClassW(&raw const class), || {
            last_os_error("RegisterClassW")
        })?;
        let hwnd = CreateWindowExW(
            WINDOW_EX_STYLE::default(),
            events_class(),
            w!("Window Layout Keeper"),
            WINDOW_STYLE::default(),
            0,
            0,
            0,
            0,
            None,
            None,
            Some(instance),
            None,
        )
        .map_err(|err| os_error("CreateWindowExW", &err))?;
        (instance, hwnd)
    };

    let mut sources = EventSources {
        instance,
        hwnd,
        session: false,
        hooks: Vec::new(),
    };

    // SAFETY: hwnd is the live window created above
    match unsafe { WTSRegisterSessionNotification(hwnd, NOTIFY_FOR_THIS_SESSION) } {
        Ok(()) => sources.session = true,
        Err(err) => return Err(os_error("WTSRegisterSessionNotification", &err)),
    }

    for event in [
        EVENT_SYSTEM_MOVESIZEEND,
        EVENT_SYSTEM_FOREGROUND,
        EVENT_SYSTEM_CAPTUREEND,
    ] {
        // SAFETY: out-of-context hook delivered to this thread's message loop
        let hook = unsafe {
            SetWinEventHook(
                event,
                event,
                None,
                Some(win_event_callback),
                0,
                0,
                WINEVENT_OUTOFCONTEXT,
            )
        };
        if hook.is_invalid() {
            return Err(PlatformError::Registration(format!(
                "SetWinEventHook failed for event 0x{event:04X}"
            )));
        }
        sources.hooks.push(hook);
    }

    Ok(sources)
}

/// Pump messages until `WM_QUIT` or an error.
fn pump_messages() {
    let mut msg = MSG::default();
    loop {
        // SAFETY: msg is a live MSG owned by this frame
        let status = unsafe { GetMessageW(&raw mut msg, None, 0, 0) };
        if status.0 <= 0 {
            if status.0 < 0 {
                error!("[pump_messages] {}", last_os_error("GetMessageW"));
            }
            break;
        }
        // SAFETY: dispatching the message we just received
        unsafe {
            let _ = TranslateMessage(&raw const msg);
            DispatchMessageW(&raw const msg);
        }
    }
}

fn run_events_thread(sink: EventSink, ready: mpsc::Sender<Result<u32, PlatformError>>) {
    SINK.set(Some(sink));
    let sources = match register_sources() {
        Ok(sources) => sources,
        Err(err) => {
            SINK.set(None);
            if let Err(mpsc::SendError(Err(err))) = ready.send(Err(err)) {
                error!("[run_events_thread] registration failed with nobody waiting: {}", err);
            }
            return;
        },
    };

    // SAFETY: reads the calling thread's id
    let thread_id = unsafe { GetCurrentThreadId() };
    info!(
        "[run_events_thread] listening with {} WinEvent hooks",
        sources.hooks.len()
    );
    if ready.send(Ok(thread_id)).is_err() {
        return;
    }

    pump_messages();
    drop(sources);
}

/// Production platform backed by user32, dwmapi and wtsapi32.
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32Desktop;

impl Win32Desktop {
    #[must_use]
    pub const fn new() -> Self { Self }
}

impl WindowInventory for Win32Desktop {
    fn windows_of_interest(&self) -> Result<Vec<WindowInfo>, PlatformError> {
        let mut windows: Vec<WindowInfo> = Vec::new();
        // SAFETY: the callback only touches `windows`, which outlives the call
        unsafe {
            EnumWindows(
                Some(enum_windows_callback),
                LPARAM(std::ptr::from_mut(&mut windows) as isize),
            )
        }
        .map_err(|err| os_error("EnumWindows", &err))?;
        trace!("[Win32Desktop::windows_of_interest] {} windows", windows.len());
        Ok(windows)
    }

    fn placement(&self, handle: WindowHandle) -> Result<Placement, PlatformError> {
        let mut wp = WINDOWPLACEMENT {
            length: size_of::<WINDOWPLACEMENT>() as u32,
            ..Default::default()
        };
        // SAFETY: wp is a live, correctly sized WINDOWPLACEMENT
        unsafe { GetWindowPlacement(to_hwnd(handle), &raw mut wp) }
            .map_err(|err| os_error("GetWindowPlacement", &err))?;
        Ok(placement_from(&wp))
    }

    fn screen_rect(&self, handle: WindowHandle) -> Result<Rect, PlatformError> {
        let mut rect = RECT::default();
        // SAFETY: rect is a live RECT
        unsafe { GetWindowRect(to_hwnd(handle), &raw mut rect) }
            .map_err(|err| os_error("GetWindowRect", &err))?;
        Ok(rect_from(&rect))
    }

    fn set_placement(&self, handle: WindowHandle, placement: &Placement) -> Result<(), PlatformError> {
        let wp = placement_to(placement);
        // SAFETY: wp is a live, correctly sized WINDOWPLACEMENT
        unsafe { SetWindowPlacement(to_hwnd(handle), &raw const wp) }
            .map_err(|err| os_error("SetWindowPlacement", &err))
    }

    fn set_window_rect(
        &self,
        handle: WindowHandle,
        rect: Rect,
        flags: SetRectFlags,
    ) -> Result<(), PlatformError> {
        let mut swp = SET_WINDOW_POS_FLAGS::default();
        if flags.contains(SetRectFlags::NO_Z_ORDER) {
            swp |= SWP_NOZORDER;
        }
        if flags.contains(SetRectFlags::ASYNC) {
            swp |= SWP_ASYNCWINDOWPOS;
        }
        // SAFETY: SetWindowPos validates the handle
        unsafe {
            SetWindowPos(
                to_hwnd(handle),
                None,
                rect.left,
                rect.top,
                rect.width,
                rect.height,
                swp,
            )
        }
        .map_err(|err| os_error("SetWindowPos", &err))
    }
}

impl DisplayTopology for Win32Desktop {
    fn monitors(&self) -> Result<Monitors, PlatformError> {
        let mut monitors: Vec<MonitorInfo> = Vec::new();
        // SAFETY: the callback only touches `monitors`, which outlives the call
        let ok = unsafe {
            EnumDisplayMonitors(
                None,
                None,
                Some(enum_monitors_callback),
                LPARAM(std::ptr::from_mut(&mut monitors) as isize),
            )
        };
        if !ok.as_bool() {
            return Err(last_os_error("EnumDisplayMonitors"));
        }
        Ok(Monitors::new(monitors))
    }
}

impl Notifications for Win32Desktop {
    fn subscribe(&self, sink: EventSink) -> Result<Subscription, PlatformError> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(EVENTS_THREAD.to_string())
            .spawn(move || run_events_thread(sink, ready_tx))
            .map_err(|err| PlatformError::Registration(format!("cannot spawn {EVENTS_THREAD}: {err}")))?;

        let thread_id = match ready_rx.recv() {
            Ok(Ok(thread_id)) => thread_id,
            Ok(Err(err)) => {
                if thread.join().is_err() {
                    error!("[Win32Desktop::subscribe] {} panicked", EVENTS_THREAD);
                }
                return Err(err);
            },
            Err(_) => {
                if thread.join().is_err() {
                    error!("[Win32Desktop::subscribe] {} panicked", EVENTS_THREAD);
                }
                return Err(PlatformError::Registration(format!(
                    "{EVENTS_THREAD} exited during setup"
                )));
            },
        };

        Ok(Subscription::new(move || {
            // SAFETY: posting to a thread id we own
            let posted = unsafe { PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) };
            if let Err(err) = posted {
                error!("[Win32Desktop::subscribe] cannot stop {}: {}", EVENTS_THREAD, err);
                return;
            }
            if thread.join().is_err() {
                error!("[Win32Desktop::subscribe] {} panicked", EVENTS_THREAD);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_survives_win32_layout() {
        let placement = Placement {
            show_state:   ShowState::Maximized,
            normal_rect:  Rect::new(-1800, 40, 1200, 900),
            min_position: Point::new(-1, -1),
            max_position: Point::new(-1, -1),
            flags:        2,
        };
        assert_eq!(placement_from(&placement_to(&placement)), placement);
    }

    #[test]
    fn existing_window_class_is_reused() {
        let os = |code| move || PlatformError::Os {
            call: "RegisterClassW",
            code,
        };
        assert!(class_registration(0xC123, os(0)).is_ok());
        assert!(class_registration(0, os(ERROR_CLASS_ALREADY_EXISTS)).is_ok());
        let refused = class_registration(0, os(5)).unwrap_err();
        assert_eq!(refused.code(), Some(5));
    }

    #[test]
    fn display_change_maps_to_changing_then_changed() {
        assert_eq!(
            translate_message(WM_DISPLAYCHANGE, WPARAM(0)),
            &[Event::DisplaySettingsChanging, Event::DisplaySettingsChanged]
        );
        assert_eq!(
            translate_message(WM_POWERBROADCAST, WPARAM(PBT_APMRESUMEAUTOMATIC)),
            &[Event::PowerResume]
        );
        assert!(translate_message(WM_POWERBROADCAST, WPARAM(0xA)).is_empty());
        assert_eq!(
            translate_message(WM_WTSSESSION_CHANGE, WPARAM(WTS_SESSION_LOCK)),
            &[Event::SessionLock]
        );
    }
}
