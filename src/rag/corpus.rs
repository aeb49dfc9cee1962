//! Built-in therapy technique passages seeded into the knowledge index.

use super::{ ChunkMetadata, KnowledgeChunk };

const ENTRIES: &[(&str, &str, &str)] = &[
    (
        "anxiety",
        "breathing",
        "When dealing with anxiety, it's important to practice deep breathing exercises. Inhale for 4 counts, hold for 4, and exhale for 4. This helps activate the parasympathetic nervous system and reduce physical symptoms of anxiety.",
    ),
    (
        "anxiety",
        "grounding",
        "Grounding techniques can help manage anxiety in the moment. The 5-4-3-2-1 technique involves identifying 5 things you can see, 4 things you can touch, 3 things you can hear, 2 things you can smell, and 1 thing you can taste.",
    ),
    (
        "anxiety",
        "relaxation",
        "Progressive muscle relaxation is an effective anxiety management technique. Systematically tense and relax different muscle groups, starting from your toes and moving up to your head.",
    ),
    (
        "depression",
        "lifestyle",
        "For depression, maintaining a regular sleep schedule and engaging in physical activity can help improve mood. Even a 10-minute walk can release endorphins and improve your mental state.",
    ),
    (
        "depression",
        "behavioral",
        "Behavioral activation is a key technique for depression. Break down daily activities into small, manageable steps and gradually increase engagement in pleasurable activities.",
    ),
    (
        "depression",
        "cognitive",
        "Cognitive restructuring helps with depression by identifying and challenging negative thought patterns. Ask yourself: 'Is this thought helpful? Is it based on facts? What's a more balanced way to look at this?'",
    ),
    (
        "relationships",
        "communication",
        "In relationship counseling, active listening involves giving full attention, reflecting back what you hear, and asking clarifying questions. This helps build understanding and trust between partners.",
    ),
    (
        "relationships",
        "communication",
        "The 'I' statement technique helps express feelings without blaming: 'I feel [emotion] when [specific situation] because [reason].' This promotes constructive dialogue and reduces defensiveness.",
    ),
    (
        "relationships",
        "boundaries",
        "Setting healthy boundaries in relationships involves clearly communicating your needs, limits, and expectations. It's important to be consistent and respectful when enforcing boundaries.",
    ),
    (
        "stress",
        "management",
        "Time management is crucial for stress reduction. Use the Eisenhower Matrix to prioritize tasks: urgent and important, important but not urgent, urgent but not important, and neither urgent nor important.",
    ),
    (
        "stress",
        "mindfulness",
        "Mindfulness meditation can reduce stress by bringing attention to the present moment. Start with just 5 minutes daily, focusing on your breath and gently bringing your mind back when it wanders.",
    ),
    (
        "stress",
        "self-care",
        "Self-care is essential for stress management. Create a daily routine that includes adequate sleep, healthy eating, regular exercise, and activities you enjoy.",
    ),
    (
        "grief",
        "emotional",
        "The grieving process is unique to each person. Allow yourself to feel all emotions without judgment. There's no 'right' way to grieve, and healing takes time.",
    ),
    (
        "grief",
        "ritual",
        "Creating rituals can help process grief. This might include writing letters to your loved one, creating a memory book, or establishing new traditions to honor their memory.",
    ),
    (
        "grief",
        "self-compassion",
        "Self-compassion is crucial during grief. Treat yourself with the same kindness you would offer a friend, acknowledging that grief is a natural response to loss.",
    ),
    (
        "self-esteem",
        "cognitive",
        "Challenge negative self-talk by identifying cognitive distortions like all-or-nothing thinking, overgeneralization, and mental filtering. Replace them with more balanced thoughts.",
    ),
    (
        "self-esteem",
        "self-compassion",
        "Practice self-compassion by treating yourself with the same kindness you'd show a friend. Acknowledge your struggles without judgment and recognize that imperfection is part of being human.",
    ),
    (
        "self-esteem",
        "goal-setting",
        "Set realistic goals and celebrate small achievements. Break larger goals into manageable steps and acknowledge your progress, no matter how small.",
    ),
    (
        "crisis",
        "intervention",
        "If someone expresses thoughts of self-harm, stay calm and listen without judgment. Ask directly about their intentions and ensure they're safe. Connect them with emergency services if needed.",
    ),
    (
        "crisis",
        "support",
        "During a panic attack, help the person focus on their breathing. Guide them through slow, deep breaths and remind them that the attack will pass. Stay present and offer reassurance.",
    ),
    (
        "crisis",
        "coping",
        "For acute stress, use the STOP technique: Stop, Take a step back, Observe your thoughts and feelings, Proceed mindfully. This helps create space between the stressor and your response.",
    ),
];

pub fn therapy_corpus() -> Vec<KnowledgeChunk> {
    ENTRIES.iter()
        .map(|(kind, technique, text)| KnowledgeChunk {
            text: text.to_string(),
            metadata: ChunkMetadata {
                kind: kind.to_string(),
                technique: technique.to_string(),
            },
        })
        .collect()
}
