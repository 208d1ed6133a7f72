//! 会话层：每个对话一个 actor
//!
//! - **SessionSupervisor**: 每轮一个新的 CancellationToken，cancel() 中止正在执行的一轮
//! - **ConversationActor**: 持有对话状态，经 mpsc 接收命令，在副本上执行一轮，成功后保存检查点并替换状态
//! - **SessionHub**: 打开/恢复对话并维护句柄表（锁只在访问表时持有）

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_util::sync::CancellationToken;

use crate::core::{ConversationEngine, ConversationState, Message, TurnResult, TutorError};
use crate::memory::StateStore;

const COMMAND_BUFFER: usize = 16;

/// 对话级取消管理
#[derive(Debug, Default)]
pub struct SessionSupervisor {
    current: Mutex<CancellationToken>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始新一轮：替换并返回本轮的 token
    pub fn begin_turn(&self) -> CancellationToken {
        let token = CancellationToken::new();
        match self.current.lock() {
            Ok(mut current) => *current = token.clone(),
            Err(poisoned) => *poisoned.into_inner() = token.clone(),
        }
        token
    }

    /// 取消当前轮；没有进行中的轮时无影响
    pub fn cancel(&self) {
        match self.current.lock() {
            Ok(current) => current.cancel(),
            Err(poisoned) => poisoned.into_inner().cancel(),
        }
    }
}

/// 发往对话 actor 的命令
#[derive(Debug)]
pub enum SessionCommand {
    /// 用户输入：挂起时作为反馈，否则作为新消息
    Send {
        input: String,
        reply: oneshot::Sender<Result<TurnResult, TutorError>>,
    },
    /// 读取当前检查点
    Snapshot {
        reply: oneshot::Sender<ConversationState>,
    },
    Shutdown,
}

pub struct ConversationActor {
    state: ConversationState,
    engine: Arc<ConversationEngine>,
    store: Arc<dyn StateStore>,
    supervisor: Arc<SessionSupervisor>,
    rx: mpsc::Receiver<SessionCommand>,
}

impl ConversationActor {
    pub fn new(
        state: ConversationState,
        engine: Arc<ConversationEngine>,
        store: Arc<dyn StateStore>,
        supervisor: Arc<SessionSupervisor>,
        rx: mpsc::Receiver<SessionCommand>,
    ) -> Self {
        Self {
            state,
            engine,
            store,
            supervisor,
            rx,
        }
    }

    pub async fn run(mut self) {
        tracing::debug!(conversation_id = %self.state.conversation_id, "conversation actor started");
        loop {
            tokio::select! {
                Some(cmd) = self.rx.recv() => {
                    match cmd {
                        SessionCommand::Send { input, reply } => {
                            let result = self.handle_input(input).await;
                            let _ = reply.send(result);
                        }
                        SessionCommand::Snapshot { reply } => {
                            let _ = reply.send(self.state.clone());
                        }
                        SessionCommand::Shutdown => break,
                    }
                }
                else => break,
            }
        }
        tracing::debug!(conversation_id = %self.state.conversation_id, "conversation actor stopped");
    }

    /// 出错时保留上一个检查点
    async fn handle_input(&mut self, input: String) -> Result<TurnResult, TutorError> {
        if self.state.is_complete {
            return Err(TutorError::ConversationComplete(self.state.conversation_id.clone()));
        }
        let input = input.trim();
        if input.is_empty() {
            return Err(TutorError::Validation("input is empty".to_string()));
        }

        let mut working = self.state.clone();
        if working.requires_human_input {
            working.human_feedback = Some(input.to_string());
        } else {
            working.add_message(Message::user(input));
        }

        let token = self.supervisor.begin_turn();
        let result = self.engine.run_turn(working, token).await?;
        self.store
            .save(&result.state.conversation_id, &result.state)
            .await?;
        self.state = result.state.clone();
        Ok(result)
    }
}

/// 对话 actor 的句柄
#[derive(Clone)]
pub struct SessionHandle {
    conversation_id: String,
    tx: mpsc::Sender<SessionCommand>,
    supervisor: Arc<SessionSupervisor>,
}

impl SessionHandle {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    fn stopped(&self) -> TutorError {
        TutorError::generic("session", format!("actor for {} stopped", self.conversation_id))
    }

    pub async fn send(&self, input: impl Into<String>) -> Result<TurnResult, TutorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Send {
                input: input.into(),
                reply,
            })
            .await
            .map_err(|_| self.stopped())?;
        rx.await.map_err(|_| self.stopped())?
    }

    pub async fn snapshot(&self) -> Result<ConversationState, TutorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Snapshot { reply })
            .await
            .map_err(|_| self.stopped())?;
        rx.await.map_err(|_| self.stopped())
    }

    /// 中止正在执行的一轮
    pub fn cancel(&self) {
        self.supervisor.cancel();
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(SessionCommand::Shutdown).await;
    }
}

pub struct SessionHub {
    engine: Arc<ConversationEngine>,
    store: Arc<dyn StateStore>,
    handles: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionHub {
    pub fn new(engine: Arc<ConversationEngine>, store: Arc<dyn StateStore>) -> Self {
        Self {
            engine,
            store,
            handles: RwLock::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<ConversationEngine> {
        &self.engine
    }

    /// 打开对话：已有 actor 直接返回；否则从存储恢复或新建，损坏的检查点按状态损坏重置
    pub async fn open(&self, conversation_id: Option<String>, user_id: &str) -> Result<SessionHandle, TutorError> {
        if let Some(id) = conversation_id.as_deref() {
            if let Some(handle) = self.handles.read().await.get(id) {
                return Ok(handle.clone());
            }
        }

        let fresh = ConversationState::new(conversation_id.clone(), user_id);
        let id = fresh.conversation_id.clone();
        let state = match self.store.load(&id).await {
            Ok(Some(state)) => match state.validate() {
                Ok(()) => state,
                Err(err) => self.engine.recover(&err, state, "session_hub"),
            },
            Ok(None) => fresh,
            Err(err @ TutorError::StateCorruption(_)) => self.engine.recover(&err, fresh, "session_hub"),
            Err(err) => return Err(err),
        };
        self.store.save(&id, &state).await?;
        tracing::info!(conversation_id = %id, messages = state.messages.len(), "conversation opened");

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let supervisor = Arc::new(SessionSupervisor::new());
        let handle = SessionHandle {
            conversation_id: id.clone(),
            tx,
            supervisor: supervisor.clone(),
        };
        let actor = ConversationActor::new(state, self.engine.clone(), self.store.clone(), supervisor, rx);

        let mut handles = self.handles.write().await;
        // 并发打开同一对话时保留先注册的句柄，多余的 actor 随发送端释放而退出
        let handle = handles.entry(id).or_insert(handle).clone();
        drop(handles);
        tokio::spawn(actor.run());
        Ok(handle)
    }

    pub async fn get(&self, conversation_id: &str) -> Option<SessionHandle> {
        self.handles.read().await.get(conversation_id).cloned()
    }

    /// 关闭 actor；检查点保留在存储中
    pub async fn close(&self, conversation_id: &str) -> bool {
        let handle = self.handles.write().await.remove(conversation_id);
        match handle {
            Some(handle) => {
                handle.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// 存储中的全部对话 ID
    pub async fn conversations(&self) -> Result<Vec<String>, TutorError> {
        self.store.list().await
    }
}
