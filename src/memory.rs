//! Memoria de conversación por sesión, sólo en proceso.
//!
//! Las sesiones viven en un LRU acotado y cada sesión guarda como mucho
//! `max_turns` turnos (se descartan los más antiguos).

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

use lru::LruCache;
use tracing::debug;

use crate::models::ConversationTurn;

/// Historial ordenado de una sesión.
#[derive(Debug, Default, Clone)]
pub struct SessionHistory {
    turns: VecDeque<ConversationTurn>,
}

impl SessionHistory {
    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Número de mensajes (usuario + asistente).
    pub fn message_count(&self) -> usize {
        self.turns.len() * 2
    }

    fn push(&mut self, turn: ConversationTurn, max_turns: Option<usize>) {
        self.turns.push_back(turn);
        if let Some(max) = max_turns {
            while self.turns.len() > max {
                self.turns.pop_front();
            }
        }
    }
}

pub struct ConversationMemory {
    sessions: Mutex<LruCache<String, SessionHistory>>,
    max_turns: Option<usize>,
}

impl ConversationMemory {
    pub fn new(max_sessions: NonZeroUsize, max_turns: Option<usize>) -> Self {
        Self {
            sessions: Mutex::new(LruCache::new(max_sessions)),
            max_turns,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, SessionHistory>> {
        // Un pánico con el lock tomado no deja el LRU a medio modificar.
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Devuelve una copia del historial de la sesión, creándola vacía si es
    /// nueva.
    pub fn get_history(&self, session_id: &str) -> SessionHistory {
        let mut sessions = self.lock();
        sessions
            .get_or_insert_mut(session_id.to_string(), || {
                debug!("Nueva sesión de conversación: {session_id}");
                SessionHistory::default()
            })
            .clone()
    }

    /// Añade un turno al final del historial de la sesión.
    pub fn append_turn(&self, session_id: &str, user: &str, assistant: &str) {
        let turn = ConversationTurn::new(user, assistant);
        let mut sessions = self.lock();
        sessions
            .get_or_insert_mut(session_id.to_string(), SessionHistory::default)
            .push(turn, self.max_turns);
    }

    /// Turnos guardados para la sesión (0 si no existe). No altera el LRU.
    pub fn len(&self, session_id: &str) -> usize {
        self.lock().peek(session_id).map_or(0, SessionHistory::len)
    }

    pub fn session_count(&self) -> usize {
        self.lock().len()
    }
}
