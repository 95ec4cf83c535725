//! Host-environment probe: which wallet providers are injected, and whether
//! the user agent looks mobile (which decides if a deep-link suggestion is
//! worth emitting).

use std::sync::{Arc, Mutex, MutexGuard};

use tokengate_engine_core::{
    AccountAddress, EngineError, HostPort, HostProfile, ProviderHandle, ProviderKind,
};

#[derive(Debug, Clone)]
pub struct HostEnvironmentAdapter {
    mode: HostMode,
    state: Arc<Mutex<HostState>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostMode {
    Deterministic,
    #[cfg(target_arch = "wasm32")]
    Browser,
}

#[derive(Debug, Default)]
struct HostState {
    injected: Option<ProviderHandle>,
    profile: HostProfile,
    probes: u64,
}

impl Default for HostEnvironmentAdapter {
    fn default() -> Self {
        #[cfg(target_arch = "wasm32")]
        {
            Self {
                mode: HostMode::Browser,
                state: Arc::new(Mutex::new(HostState::default())),
            }
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            Self::deterministic()
        }
    }
}

impl HostEnvironmentAdapter {
    /// Empty host: nothing injected until a test or driver scripts it.
    pub fn deterministic() -> Self {
        Self {
            mode: HostMode::Deterministic,
            state: Arc::new(Mutex::new(HostState::default())),
        }
    }

    pub fn with_injected(kind: ProviderKind, native_address: Option<AccountAddress>) -> Self {
        let host = Self::deterministic();
        host.inject(ProviderHandle {
            kind,
            ready: true,
            native_address,
        });
        host
    }

    pub fn inject(&self, handle: ProviderHandle) {
        self.lock_scripting().injected = Some(handle);
    }

    pub fn clear_injected(&self) {
        self.lock_scripting().injected = None;
    }

    pub fn set_mobile(&self, mobile: bool) {
        self.lock_scripting().profile.mobile = mobile;
    }

    pub fn set_user_agent(&self, user_agent: &str) {
        let mut g = self.lock_scripting();
        g.profile.mobile = is_mobile_user_agent(user_agent);
        g.profile.user_agent = Some(user_agent.to_owned());
    }

    pub fn probe_count(&self) -> u64 {
        self.lock_scripting().probes
    }

    fn lock(&self) -> Result<MutexGuard<'_, HostState>, EngineError> {
        self.state
            .lock()
            .map_err(|e| EngineError::Transport(format!("host state lock poisoned: {e}")))
    }

    fn lock_scripting(&self) -> MutexGuard<'_, HostState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn is_mobile_user_agent(user_agent: &str) -> bool {
    let lowered = user_agent.to_ascii_lowercase();
    ["android", "iphone", "ipad", "mobile"]
        .iter()
        .any(|marker| lowered.contains(marker))
}

impl HostPort for HostEnvironmentAdapter {
    fn probe_once(&self) -> Result<Option<ProviderHandle>, EngineError> {
        let mut g = self.lock()?;
        g.probes += 1;
        match self.mode {
            HostMode::Deterministic => Ok(g.injected.clone()),
            #[cfg(target_arch = "wasm32")]
            HostMode::Browser => {
                drop(g);
                browser_probe()
            }
        }
    }

    fn profile(&self) -> Result<HostProfile, EngineError> {
        match self.mode {
            HostMode::Deterministic => Ok(self.lock()?.profile.clone()),
            #[cfg(target_arch = "wasm32")]
            HostMode::Browser => browser_profile(),
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn browser_probe() -> Result<Option<ProviderHandle>, EngineError> {
    use wasm_bindgen::JsValue;

    let Some(window) = web_sys::window() else {
        return Ok(None);
    };
    let window: JsValue = window.into();

    let ethereum = get_prop(&window, "ethereum");
    if !ethereum.is_null() && !ethereum.is_undefined() {
        let native_address = get_prop(&ethereum, "selectedAddress")
            .as_string()
            .map(AccountAddress::new);
        return Ok(Some(ProviderHandle {
            kind: ProviderKind::Evm,
            ready: true,
            native_address,
        }));
    }

    let tron_web = get_prop(&window, "tronWeb");
    if !tron_web.is_null() && !tron_web.is_undefined() {
        let ready = get_prop(&tron_web, "ready").as_bool().unwrap_or(false);
        let native_address = {
            let default_address = get_prop(&tron_web, "defaultAddress");
            get_prop(&default_address, "base58")
                .as_string()
                .map(AccountAddress::new)
        };
        return Ok(Some(ProviderHandle {
            kind: ProviderKind::Tron,
            ready,
            native_address,
        }));
    }

    Ok(None)
}

#[cfg(target_arch = "wasm32")]
fn browser_profile() -> Result<HostProfile, EngineError> {
    let window = web_sys::window()
        .ok_or_else(|| EngineError::Transport("missing window".to_owned()))?;
    let user_agent = window
        .navigator()
        .user_agent()
        .map_err(|e| EngineError::Transport(format!("navigator.userAgent failed: {e:?}")))?;
    Ok(HostProfile {
        mobile: is_mobile_user_agent(&user_agent),
        user_agent: Some(user_agent),
    })
}

#[cfg(target_arch = "wasm32")]
fn get_prop(target: &wasm_bindgen::JsValue, key: &str) -> wasm_bindgen::JsValue {
    js_sys::Reflect::get(target, &wasm_bindgen::JsValue::from_str(key))
        .unwrap_or(wasm_bindgen::JsValue::UNDEFINED)
}
