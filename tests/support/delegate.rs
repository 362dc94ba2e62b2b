//! A delegate recording every call before forwarding it to the native one.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::SystemTime,
};

use rquest_engine::{
    BuilderDelegate, Context, Engine, HttpCacheMode, LibraryLoader, NativeBuilder, Result,
};

pub type Calls = Arc<Mutex<Vec<String>>>;

pub struct Recording {
    calls: Calls,
    inner: NativeBuilder,
}

impl Recording {
    #[allow(unused)]
    pub fn context(calls: &Calls) -> Context {
        let calls = calls.clone();
        super::context().with_builder_delegate(move |context| {
            Box::new(Recording {
                calls: calls.clone(),
                inner: NativeBuilder::new(context),
            }) as Box<dyn BuilderDelegate>
        })
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl BuilderDelegate for Recording {
    fn default_user_agent(&self) -> String {
        self.record("default_user_agent".into());
        self.inner.default_user_agent()
    }

    fn set_user_agent(&mut self, user_agent: String) {
        self.record(format!("set_user_agent({user_agent})"));
        self.inner.set_user_agent(user_agent)
    }

    fn set_storage_path(&mut self, path: PathBuf) {
        self.record(format!("set_storage_path({})", path.display()));
        self.inner.set_storage_path(path)
    }

    fn set_library_loader(&mut self, loader: Arc<dyn LibraryLoader>) {
        self.record("set_library_loader".into());
        self.inner.set_library_loader(loader)
    }

    fn enable_quic(&mut self, value: bool) {
        self.record(format!("enable_quic({value})"));
        self.inner.enable_quic(value)
    }

    fn enable_http2(&mut self, value: bool) {
        self.record(format!("enable_http2({value})"));
        self.inner.enable_http2(value)
    }

    fn enable_sdch(&mut self, value: bool) {
        self.record(format!("enable_sdch({value})"));
        self.inner.enable_sdch(value)
    }

    fn enable_http_cache(&mut self, mode: HttpCacheMode, max_size: u64) {
        self.record(format!("enable_http_cache({mode:?}, {max_size})"));
        self.inner.enable_http_cache(mode, max_size)
    }

    fn add_quic_hint(&mut self, host: &str, port: u16, alternate_port: u16) -> Result<()> {
        self.record(format!("add_quic_hint({host}, {port}, {alternate_port})"));
        self.inner.add_quic_hint(host, port, alternate_port)
    }

    fn add_public_key_pins(
        &mut self,
        host: &str,
        pins: Vec<Vec<u8>>,
        include_subdomains: bool,
        expiration: SystemTime,
    ) -> Result<()> {
        self.record(format!(
            "add_public_key_pins({host}, {}, {include_subdomains})",
            pins.len()
        ));
        self.inner
            .add_public_key_pins(host, pins, include_subdomains, expiration)
    }

    fn enable_public_key_pinning_bypass_for_local_trust_anchors(&mut self, value: bool) {
        self.record(format!("enable_pkp_bypass({value})"));
        self.inner
            .enable_public_key_pinning_bypass_for_local_trust_anchors(value)
    }

    fn build(&self) -> Result<Engine> {
        self.record("build".into());
        self.inner.build()
    }
}
