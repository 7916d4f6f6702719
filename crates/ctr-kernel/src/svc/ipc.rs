use std::cell::RefCell;
use std::rc::Rc;

use ctr_mem::AddressSpace;
use tracing::{debug, warn};

use super::{DispatchOutcome, Kernel, SvcContext, SvcResult};
use crate::error::{KernelError, KernelResult};
use crate::handle::{Handle, HandleType, ObjectRef};
use crate::object::{KernelObject, Port, PortState, ServiceRef, Session, SessionState, Side};

/// Longest port name, excluding the terminator.
pub const MAX_PORT_NAME: usize = 11;

/// Offset of the IPC command buffer inside thread local storage.
const COMMAND_BUFFER_OFFSET: u32 = 0x80;

fn read_port_name(mem: &AddressSpace, ptr: u32) -> KernelResult<String> {
    let mut name = Vec::with_capacity(MAX_PORT_NAME);
    for i in 0..=MAX_PORT_NAME as u32 {
        let byte = mem.read_u8(ptr.wrapping_add(i))?;
        if byte == 0 {
            return Ok(String::from_utf8_lossy(&name).into_owned());
        }
        name.push(byte);
    }
    Err(KernelError::PortNameTooLong)
}

fn session_pair(state: SessionState) -> (ObjectRef, ObjectRef) {
    let state = Rc::new(RefCell::new(state));
    let server = KernelObject::Session(Session {
        side: Side::Server,
        state: Rc::clone(&state),
    });
    let client = KernelObject::Session(Session {
        side: Side::Client,
        state,
    });
    (Rc::new(RefCell::new(server)), Rc::new(RefCell::new(client)))
}

impl Kernel {
    /// Opens a session on `port` and registers its client end.
    ///
    /// Service-backed ports answer requests directly; other ports queue the server end until a
    /// guest server accepts it. The port is only updated once the handle exists.
    fn connect(&mut self, port: &Rc<RefCell<PortState>>) -> KernelResult<Handle> {
        let service = {
            let state = port.borrow();
            if state.sessions >= state.max_sessions {
                return Err(KernelError::MaxConnections {
                    max: state.max_sessions,
                });
            }
            state.service.clone()
        };

        let queued = service.is_none();
        let (server, client) = session_pair(SessionState {
            service,
            port: Some(Rc::downgrade(port)),
            ..SessionState::default()
        });
        let handle = self.handles.insert_ref(client)?;

        let mut state = port.borrow_mut();
        state.sessions += 1;
        if queued {
            state.pending.push_back(server);
        }
        Ok(handle)
    }

    /// Registers a host service reachable through `ConnectToPort(name)`.
    pub fn register_service(&mut self, name: &str, handler: ServiceRef) -> KernelResult<()> {
        if name.len() > MAX_PORT_NAME {
            return Err(KernelError::PortNameTooLong);
        }
        if self.ports.contains_key(name) {
            return Err(KernelError::PortExists(name.to_owned()));
        }

        debug!("registered service port {name:?}");
        let state = PortState {
            name: Some(name.to_owned()),
            max_sessions: u32::MAX,
            service: Some(handler),
            ..PortState::default()
        };
        self.ports
            .insert(name.to_owned(), Rc::new(RefCell::new(state)));
        Ok(())
    }

    /// `ConnectToPort(_, name_ptr) -> session`
    pub(super) fn svc_connect_to_port(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let name = read_port_name(ctx.mem, ctx.cpu.reg(1))?;
        let port = self
            .ports
            .get(&name)
            .cloned()
            .ok_or_else(|| KernelError::PortNotFound(name.clone()))?;

        let handle = self.connect(&port)?;
        debug!("connected to {name:?} as {handle}");
        ctx.cpu.set_reg(1, handle.raw());
        Ok(DispatchOutcome::Completed.into())
    }

    /// `CreatePort(_, _, name_ptr, max_sessions) -> (server, client)`
    pub(super) fn svc_create_port(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let name_ptr = ctx.cpu.reg(2);
        let max_sessions = ctx.cpu.reg(3);

        let name = if name_ptr != 0 {
            let name = read_port_name(ctx.mem, name_ptr)?;
            if self.ports.contains_key(&name) {
                return Err(KernelError::PortExists(name));
            }
            Some(name)
        } else {
            None
        };

        let state = Rc::new(RefCell::new(PortState {
            name: name.clone(),
            max_sessions,
            ..PortState::default()
        }));
        let server = self.handles.insert(KernelObject::Port(Port {
            side: Side::Server,
            state: Rc::clone(&state),
        }))?;
        let client = match self.handles.insert(KernelObject::Port(Port {
            side: Side::Client,
            state: Rc::clone(&state),
        })) {
            Ok(client) => client,
            Err(err) => {
                let _ = self.handles.close(server);
                return Err(err);
            }
        };
        if let Some(name) = name {
            debug!("guest registered port {name:?}");
            self.ports.insert(name, state);
        }

        ctx.cpu.set_reg(1, server.raw());
        ctx.cpu.set_reg(2, client.raw());
        Ok(DispatchOutcome::Completed.into())
    }

    /// `CreateSessionToPort(_, client_port) -> session`
    pub(super) fn svc_create_session_to_port(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let handle = Handle(ctx.cpu.reg(1));
        let object = self.handles.get_typed(handle, HandleType::Port)?;
        let port = match &*object.borrow() {
            KernelObject::Port(port) if port.side == Side::Client => Rc::clone(&port.state),
            _ => return Err(KernelError::InvalidHandle(handle)),
        };

        let session = self.connect(&port)?;
        ctx.cpu.set_reg(1, session.raw());
        Ok(DispatchOutcome::Completed.into())
    }

    /// `CreateSession() -> (server, client)`
    pub(super) fn svc_create_session(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let (server, client) = session_pair(SessionState::default());
        let server = self.handles.insert_ref(server)?;
        let client = match self.handles.insert_ref(client) {
            Ok(client) => client,
            Err(err) => {
                let _ = self.handles.close(server);
                return Err(err);
            }
        };
        ctx.cpu.set_reg(1, server.raw());
        ctx.cpu.set_reg(2, client.raw());
        Ok(DispatchOutcome::Completed.into())
    }

    /// `AcceptSession(_, server_port) -> session`
    pub(super) fn svc_accept_session(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let handle = Handle(ctx.cpu.reg(1));
        let object = self.handles.get_typed(handle, HandleType::Port)?;
        let pending = match &*object.borrow() {
            KernelObject::Port(port) if port.side == Side::Server => {
                port.state.borrow_mut().pending.pop_front()
            }
            _ => return Err(KernelError::InvalidHandle(handle)),
        };

        let server = pending.ok_or(KernelError::NoPendingSession { handle })?;
        let session = self.handles.insert_ref(server)?;
        ctx.cpu.set_reg(1, session.raw());
        Ok(DispatchOutcome::Completed.into())
    }

    /// `SendSyncRequest(session)`; the command buffer lives in the caller's TLS.
    pub(super) fn svc_send_sync_request(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let handle = Handle(ctx.cpu.reg(0));
        let object = self.handles.get_typed(handle, HandleType::Session)?;
        let state = match &*object.borrow() {
            KernelObject::Session(session) => Rc::clone(&session.state),
            _ => return Err(KernelError::InvalidHandle(handle)),
        };

        let service = {
            let mut state = state.borrow_mut();
            if state.closed {
                return Err(KernelError::SessionClosed { handle });
            }
            state.requests += 1;
            state.service.clone()
        };

        let tls = ctx.sched.thread_local_storage(ctx.sched.current_thread());
        let cmd_buf = tls.wrapping_add(COMMAND_BUFFER_OFFSET);
        let Some(service) = service else {
            let header = ctx.mem.read_u32(cmd_buf).unwrap_or(0);
            warn!("SendSyncRequest on {handle} (header 0x{header:08x}) has no service; stubbed");
            return Ok(DispatchOutcome::Stubbed.into());
        };

        service.borrow_mut().handle_request(ctx.mem, cmd_buf)?;
        Ok(DispatchOutcome::Completed.into())
    }
}
