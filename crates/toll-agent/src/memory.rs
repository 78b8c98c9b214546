use dashmap::DashMap;

use toll_types::message::Message;

/// In-process conversation history, keyed by thread id.
#[derive(Default)]
pub struct ThreadMemory {
    threads: DashMap<String, Vec<Message>>,
}

impl ThreadMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self, thread_id: &str) -> Vec<Message> {
        self.threads
            .get(thread_id)
            .map(|h| h.value().clone())
            .unwrap_or_default()
    }

    pub fn append(&self, message: Message) {
        self.threads
            .entry(message.thread_id.clone())
            .or_default()
            .push(message);
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use toll_types::message::Role;

    #[test]
    fn threads_are_isolated() {
        let memory = ThreadMemory::new();
        memory.append(Message::user("t1", "hello"));
        memory.append(Message::assistant("t1", "hi"));
        memory.append(Message::user("t2", "other"));

        let t1 = memory.history("t1");
        assert_eq!(t1.len(), 2);
        assert_eq!(t1[1].role, Role::Assistant);
        assert_eq!(memory.history("t2").len(), 1);
        assert!(memory.history("t3").is_empty());
    }
}
