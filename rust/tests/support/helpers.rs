#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use postbox_core::{Chat, ChatId, Message, MessageHandler, MsgId};

pub fn wait_until(what: &str, timeout: Duration, f: impl FnMut() -> bool) {
    wait_until_with_poll(what, timeout, Duration::from_millis(10), f);
}

pub fn wait_until_with_poll(
    what: &str,
    timeout: Duration,
    poll: Duration,
    mut f: impl FnMut() -> bool,
) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(poll);
    }
    panic!("{what}: condition not met within {timeout:?}");
}

pub fn write_config(data_dir: &Path, v: serde_json::Value) {
    let path = data_dir.join(postbox_core::CONFIG_FILE_NAME);
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

/// Records every delivery.
#[derive(Clone, Default)]
pub struct Collector(pub Arc<Mutex<Vec<(Chat, Message)>>>);

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn ids(&self) -> Vec<(ChatId, MsgId)> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .map(|(chat, msg)| (chat.id, msg.id))
            .collect()
    }
}

impl MessageHandler for Collector {
    fn on_new_message(&self, chat: Chat, message: Message) {
        self.0.lock().unwrap().push((chat, message));
    }
}

pub fn chat(id: u32, name: &str) -> Chat {
    Chat {
        id: ChatId(id),
        name: name.to_string(),
    }
}

pub fn message(id: u32, chat_id: u32, unclassified: bool) -> Message {
    Message {
        id: MsgId(id),
        chat_id: ChatId(chat_id),
        from_addr: format!("sender{id}@example.org"),
        text: format!("message {id}"),
        unclassified,
    }
}
